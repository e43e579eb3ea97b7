//! Session over a real TCP socket, checked against a bare listener that
//! decodes the byte stream with the core protocol functions.

use drawlink_client::application::session::{Session, SessionStatus};
use drawlink_client::infrastructure::network::TcpFrameSink;
use drawlink_core::{decode_frame, Command, Gp, Handle, Scene};
use glam::DVec3;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Splits a captured byte stream back into commands.
fn decode_all(mut bytes: &[u8]) -> Vec<Command> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (cmd, used) = decode_frame(bytes).expect("whole frames only");
        out.push(cmd);
        bytes = &bytes[used..];
    }
    out
}

#[tokio::test]
async fn test_session_stream_rebuilds_identical_scene() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink = TcpFrameSink::connect(listener.local_addr().unwrap()).await.unwrap();
    let (mut peer, _) = listener.accept().await.unwrap();

    let mut session = Session::new(256);
    session.open(sink);
    let s = session.scene_begin("S1").await.unwrap();
    let group = session.group("g", Handle::NONE).unwrap();
    session.point(DVec3::new(1.0, 2.0, 3.0), 1.0, group).unwrap();
    session.line(DVec3::ZERO, DVec3::X, group).unwrap();
    session.text(DVec3::Y, "label", Handle::NONE).unwrap();

    // Act
    assert_eq!(session.scene_flush().await.unwrap(), 4);
    let local = session.scene(s).unwrap().clone();
    session.close().await.unwrap();
    let mut bytes = Vec::new();
    peer.read_to_end(&mut bytes).await.unwrap();

    // Assert: replay the stream into a fresh scene.
    let commands = decode_all(&bytes);
    let mut rebuilt = None::<Scene>;
    for cmd in &commands {
        match cmd {
            Command::Begin { payload, .. } => rebuilt = Some(Scene::from_bytes(payload).unwrap()),
            Command::Add { scene, payload } => {
                assert_eq!(*scene, s);
                rebuilt.as_mut().unwrap().add_from_stream(payload).unwrap();
            }
            _ => {}
        }
    }
    let rebuilt = rebuilt.expect("begin frame");
    assert_eq!(rebuilt, local);
    assert_eq!(rebuilt.children(group).unwrap().len(), 2);
    assert_eq!(commands.last(), Some(&Command::Exit));
}

#[tokio::test]
async fn test_entities_are_stamped_before_transfer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink = TcpFrameSink::connect(listener.local_addr().unwrap()).await.unwrap();
    let (mut peer, _) = listener.accept().await.unwrap();

    let mut session = Session::new(4096);
    session.open(sink);
    session.scene_begin("S1").await.unwrap();
    let mut tool = session.tool_state().clone();
    tool.appearance.brush.width = 5.0;
    session.set_tool_state(tool);
    session.point(DVec3::ZERO, 0.5, Handle::NONE).unwrap();
    session.scene_flush().await.unwrap();
    session.close().await.unwrap();

    let mut bytes = Vec::new();
    peer.read_to_end(&mut bytes).await.unwrap();

    let add = decode_all(&bytes)
        .into_iter()
        .find_map(|c| match c {
            Command::Add { payload, .. } => Some(payload),
            _ => None,
        })
        .expect("one add frame");
    match Gp::from_bytes(&add).unwrap() {
        Gp::Point(p) => {
            assert_eq!(p.base.appearance.brush.width, 5.0);
            assert_eq!(p.radius, 0.5);
        }
        other => panic!("expected a point, got {other:?}"),
    }
}

#[tokio::test]
async fn test_peer_hangup_flips_session_to_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink = TcpFrameSink::connect(listener.local_addr().unwrap()).await.unwrap();
    let (peer, _) = listener.accept().await.unwrap();
    drop(peer);
    drop(listener);

    let mut session = Session::new(64);
    session.open(sink);

    // A write to a reset socket can take a few attempts to fail.
    let mut failed = false;
    for i in 0..50 {
        if session.scene_begin(&format!("s{i}")).await.is_err() {
            failed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(failed);
    assert_eq!(session.status(), SessionStatus::Error);
}
