//! [`Wire`] implementations for every value the codec can carry.

use glam::{DQuat, DVec3};

use super::{ByteReader, CodecError};

/// A value with a fixed binary encoding.
pub trait Wire: Sized {
    /// Appends the encoding of `self` to `out`.
    fn write(&self, out: &mut Vec<u8>);

    /// Decodes one value, advancing `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the bytes are short or invalid for this type.
    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError>;
}

macro_rules! impl_wire_le {
    ($($ty:ty => $size:literal),* $(,)?) => {
        $(
            impl Wire for $ty {
                fn write(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
                    reader.take_array::<$size>().map(<$ty>::from_le_bytes)
                }
            }
        )*
    };
}

impl_wire_le! {
    u8 => 1,
    u16 => 2,
    u32 => 4,
    u64 => 8,
    i32 => 4,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

impl Wire for bool {
    fn write(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match reader.take_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

impl Wire for String {
    fn write(&self, out: &mut Vec<u8>) {
        (self.len() as u64).write(out);
        out.extend_from_slice(self.as_bytes());
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let len = reader.take_len()?;
        let bytes = reader.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CodecError::InvalidUtf8(e.to_string()))
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn write(&self, out: &mut Vec<u8>) {
        (self.len() as u64).write(out);
        for item in self {
            item.write(out);
        }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let count = reader.take_len()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}

impl<T: Wire + Copy + Default, const N: usize> Wire for [T; N] {
    fn write(&self, out: &mut Vec<u8>) {
        for item in self {
            item.write(out);
        }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let mut items = [T::default(); N];
        for slot in items.iter_mut() {
            *slot = T::read(reader)?;
        }
        Ok(items)
    }
}

// Geometry records travel as opaque fixed-layout payload.

impl Wire for DVec3 {
    fn write(&self, out: &mut Vec<u8>) {
        self.to_array().write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        <[f64; 3]>::read(reader).map(DVec3::from_array)
    }
}

impl Wire for DQuat {
    fn write(&self, out: &mut Vec<u8>) {
        self.to_array().write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        <[f64; 4]>::read(reader).map(DQuat::from_array)
    }
}
