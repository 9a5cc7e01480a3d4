use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tv_screensaver::events::ScreensaverCommand;
use tv_screensaver::tasks::control;

async fn connect(path: &std::path::Path) -> UnixStream {
    for _ in 0..50 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("control socket never came up at {}", path.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forwards_commands_from_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("control.sock");
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(control::run(path.clone(), tx, cancel.clone()));

    let mut stream = connect(&path).await;
    stream
        .write_all(b"{\"command\":\"playback-started\"}\n{\"command\":\"block\"}")
        .await
        .unwrap();
    drop(stream);

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a command")
        .expect("channel closed unexpectedly");
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a second command")
        .expect("channel closed unexpectedly");
    assert_eq!(first, ScreensaverCommand::PlaybackStarted);
    assert_eq!(second, ScreensaverCommand::Block);

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(!path.exists(), "socket should be removed on shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payload_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(control::run(path.clone(), tx, cancel.clone()));

    let mut stream = connect(&path).await;
    stream.write_all(b"{\"command\":\"self-destruct\"}").await.unwrap();
    drop(stream);

    let mut stream = connect(&path).await;
    stream
        .write_all(br#"{"command":"user-activity"}"#)
        .await
        .unwrap();
    drop(stream);

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a command")
        .expect("channel closed unexpectedly");
    assert_eq!(received, ScreensaverCommand::UserActivity);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    std::fs::write(&path, b"stale").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(control::run(path.clone(), tx, cancel.clone()));

    let mut stream = connect(&path).await;
    stream.write_all(br#"{"command":"enable"}"#).await.unwrap();
    drop(stream);

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a command")
        .expect("channel closed unexpectedly");
    assert_eq!(received, ScreensaverCommand::Enable);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
