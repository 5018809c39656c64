use std::time::Duration;

use dx_share::buffer::{MemoryBuffer, Position, TextBuffer};
use dx_share::fingerprint::{compute, Encoding};
use dx_share::sync::actor::ActorSettings;
use dx_share::sync::{
    remote, DocumentId, DocumentSession, Message as SyncFrame, Role, SessionActor, SessionEvent,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

async fn start_relay() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = dx_share::server::serve(listener).await;
    });
    format!("ws://{addr}")
}

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(Duration::from_secs(3), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relay_forwards_to_others_only() {
    let base = start_relay().await;
    let url = format!("{base}/ws/notes");

    let (a, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    let (b, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    let (mut a_tx, mut a_rx) = a.split();
    let (_b_tx, mut b_rx) = b.split();
    sleep(Duration::from_millis(100)).await;

    a_tx.send(Message::Binary("CancelEdit@@@@c".into())).await.unwrap();

    let got = timeout(Duration::from_secs(3), b_rx.next())
        .await
        .expect("relay did not forward")
        .unwrap()
        .unwrap();
    assert_eq!(got, Message::Binary("CancelEdit@@@@c".into()));

    // The sender never hears its own frame.
    assert!(timeout(Duration::from_millis(200), a_rx.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_actors_share_through_relay() {
    let base = start_relay().await;
    let document_id = DocumentId::from("notes");
    let url = remote::room_url(&base, &document_id).unwrap();

    let spawn = |text: &str| {
        SessionActor::spawn(
            DocumentSession::new(document_id.clone(), Encoding::Utf8),
            MemoryBuffer::new(text),
            ActorSettings::default(),
        )
    };
    let (writer, writer_out) = spawn("X\n");
    let (follower, follower_out) = spawn("Y\n");
    let mut follower_events = follower.subscribe();

    remote::connect_peer(url.as_str(), writer.clone(), writer_out)
        .await
        .unwrap();
    let link = remote::connect_peer(url.as_str(), follower.clone(), follower_out)
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    // Mismatched texts: the follower resyncs before following the edit.
    writer.start_local_edit().await.unwrap();
    wait_for(&mut follower_events, |e| matches!(e, SessionEvent::Resynced { .. })).await;
    assert_eq!(follower.text().await.unwrap(), "X\n");
    assert_eq!(follower.role().await.unwrap(), Role::RemoteWriter);

    writer
        .with_buffer(|b| b.insert_local(Position::new(1, 0), "Z\n"))
        .await
        .unwrap()
        .unwrap();
    writer.commit_local_edit().await.unwrap();
    wait_for(&mut follower_events, |e| {
        matches!(e, SessionEvent::RemoteEditApplied { .. })
    })
    .await;
    assert_eq!(follower.text().await.unwrap(), "X\nZ\n");
    assert_eq!(follower.role().await.unwrap(), Role::Idle);

    // Aborting the link skips the reset, so it is signalled by hand.
    writer.start_local_edit().await.unwrap();
    wait_for(&mut follower_events, |e| matches!(e, SessionEvent::RemoteEditStarted)).await;
    link.abort();
    follower.disconnected().await.unwrap();
    let event = wait_for(&mut follower_events, |e| {
        matches!(e, SessionEvent::SessionReset { .. })
    })
    .await;
    assert_eq!(
        event,
        SessionEvent::SessionReset {
            previous: Role::RemoteWriter
        }
    );
    let buffer = follower.shutdown().await.unwrap();
    assert!(!buffer.is_read_only());
    assert_eq!(buffer.text(), "X\nZ\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn socket_close_resets_follower() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    // A writer that announces an edit and then hangs up.
    let start = SyncFrame::StartEdit(compute("shared\n", Encoding::Utf8).unwrap()).encode();
    let writer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Binary(start)).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let (follower, follower_out) = SessionActor::spawn(
        DocumentSession::new(DocumentId::from("notes"), Encoding::Utf8),
        MemoryBuffer::new("shared\n"),
        ActorSettings::default(),
    );
    let mut events = follower.subscribe();
    remote::connect_peer(&url, follower.clone(), follower_out)
        .await
        .unwrap();

    wait_for(&mut events, |e| matches!(e, SessionEvent::RemoteEditStarted)).await;
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::SessionReset { .. })).await;
    assert_eq!(
        event,
        SessionEvent::SessionReset {
            previous: Role::RemoteWriter
        }
    );
    writer.await.unwrap();

    assert_eq!(follower.role().await.unwrap(), Role::Idle);
    let buffer = follower.shutdown().await.unwrap();
    assert!(!buffer.is_read_only());
    assert_eq!(buffer.text(), "shared\n");
}
