use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use logsync::{
    FetchRequest, HttpLogSource, LogScope, LogSource, Severity, SourceConfig, SyncError,
};

/// Serves exactly one response and hands back the request line it saw.
async fn serve_once(
    status: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        let head = String::from_utf8_lossy(&head).into_owned();
        let request_line = head.lines().next().unwrap_or_default().to_string();
        let _ = tx.send(request_line);

        tokio::time::sleep(delay).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    (format!("http://{}", addr), rx)
}

fn source(base_url: String, timeout_ms: u64) -> HttpLogSource {
    HttpLogSource::new(&SourceConfig {
        base_url,
        request_timeout_ms: timeout_ms,
    })
    .unwrap()
}

#[tokio::test]
async fn fetches_trial_history_page() {
    let body = r#"[
        {"id": 41, "time": "2024-03-01T10:00:00Z", "level": "INFO", "message": "epoch 1"},
        {"id": 42, "time": "2024-03-01T10:00:01Z", "level": "WARNING", "message": "slow step"}
    ]"#;
    let (url, request_line) = serve_once("200 OK", body, Duration::ZERO).await;

    let records = source(url, 5000)
        .fetch(FetchRequest::older_than(LogScope::Trial(12), 43, 100))
        .await
        .unwrap();

    assert_eq!(
        request_line.await.unwrap(),
        "GET /trials/12/logs?less_than_id=43&tail=100 HTTP/1.1"
    );
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].id, 42);
    assert_eq!(records[1].level, Some(Severity::Warn));
    assert_eq!(records[1].text, "slow step");
}

#[tokio::test]
async fn forward_poll_query() {
    let (url, request_line) = serve_once("200 OK", "[]", Duration::ZERO).await;

    let records = source(url, 5000)
        .fetch(FetchRequest::newer_than(LogScope::Master, 999, 1000))
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(
        request_line.await.unwrap(),
        "GET /logs?greater_than_id=999&limit=1000 HTTP/1.1"
    );
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let (url, _) = serve_once("404 Not Found", r#"{"error":"no such trial"}"#, Duration::ZERO).await;

    let err = source(url, 5000)
        .fetch(FetchRequest::tail(LogScope::Trial(404), 10))
        .await
        .unwrap_err();

    match err {
        SyncError::Status { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("no such trial"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (url, _) = serve_once("200 OK", r#"{"not": "a list"}"#, Duration::ZERO).await;

    let err = source(url, 5000)
        .fetch(FetchRequest::tail(LogScope::Master, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Decode(_)));
}

#[tokio::test]
async fn slow_server_times_out() {
    let (url, _) = serve_once("200 OK", "[]", Duration::from_secs(5)).await;

    let err = source(url, 50)
        .fetch(FetchRequest::tail(LogScope::Master, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Timeout { millis: 50 }));
}

#[tokio::test]
async fn unreachable_master_is_a_transport_error() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = source(format!("http://{}", addr), 5000)
        .fetch(FetchRequest::tail(LogScope::Master, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
}
