//! Endpoint failover behavior against stub HTTP servers

use peg_analyzer_integrations::{CompletionBackend, LlmClient, LlmOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve every connection with a fixed status line and body, counting hits.
async fn spawn_endpoint(
    status_line: &'static str,
    body: &'static str,
    hits: Arc<AtomicUsize>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let hits = hits.clone();
            tokio::spawn(async move {
                hits.fetch_add(1, Ordering::SeqCst);

                // drain the request: headers, then content-length bytes of body
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let Ok(n) = socket.read(&mut chunk).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                    if let Some(header_end) = find_subslice(&buffer, b"\r\n\r\n") {
                        let headers =
                            String::from_utf8_lossy(&buffer[..header_end]).to_lowercase();
                        let content_length = headers
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|value| value.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if buffer.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }

                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

const CHAT_OK: &str = r#"{"choices":[{"message":{"role":"assistant","content":"{\"summary\": \"all good\"}"}}],"model":"m1"}"#;

fn options(endpoints: Vec<String>, max_retries: u32) -> LlmOptions {
    LlmOptions {
        endpoints,
        max_retries,
        backoff_base: 0.0, // keep the test fast; jitter alone remains
        timeout: Duration::from_secs(5),
        ..LlmOptions::default()
    }
}

#[tokio::test]
async fn test_failover_after_retryable_errors() {
    let e1_hits = Arc::new(AtomicUsize::new(0));
    let e2_hits = Arc::new(AtomicUsize::new(0));
    let e1 = spawn_endpoint("503 Service Unavailable", "{}", e1_hits.clone()).await;
    let e2 = spawn_endpoint("200 OK", CHAT_OK, e2_hits.clone()).await;

    let client = LlmClient::new(options(vec![e1.clone(), e2.clone()], 3)).unwrap();
    let completion = client.complete("prompt").await.unwrap();

    assert!(completion.text.contains("all good"));
    assert_eq!(completion.endpoint, e2);
    assert_eq!(completion.endpoints_attempted, vec![e1, e2]);
    assert_eq!(completion.model.as_deref(), Some("m1"));
    // three attempts burned on the first endpoint, one on the second
    assert_eq!(e1_hits.load(Ordering::SeqCst), 3);
    assert_eq!(e2_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_surfaces_unavailable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let e1 = spawn_endpoint("503 Service Unavailable", "{}", hits.clone()).await;

    let client = LlmClient::new(options(vec![e1.clone()], 2)).unwrap();
    let err = client.complete("prompt").await.unwrap_err();

    assert_eq!(err.kind(), "llm_unavailable");
    match err {
        peg_analyzer_types::AnalyzerError::LlmUnavailable {
            endpoints_attempted, ..
        } => assert_eq!(endpoints_attempted, vec![e1]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_fails_over_without_retry() {
    let e1_hits = Arc::new(AtomicUsize::new(0));
    let e2_hits = Arc::new(AtomicUsize::new(0));
    let e1 = spawn_endpoint("400 Bad Request", "{\"error\": \"bad\"}", e1_hits.clone()).await;
    let e2 = spawn_endpoint("200 OK", CHAT_OK, e2_hits.clone()).await;

    let client = LlmClient::new(options(vec![e1.clone(), e2.clone()], 3)).unwrap();
    let completion = client.complete("prompt").await.unwrap();

    assert!(completion.text.contains("all good"));
    assert_eq!(completion.endpoint, e2);
    assert_eq!(completion.endpoints_attempted, vec![e1, e2]);
    // a 4xx is not retried at its endpoint, the next endpoint is tried
    assert_eq!(e1_hits.load(Ordering::SeqCst), 1);
    assert_eq!(e2_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_endpoints_fatal_surfaces_unavailable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let e1 = spawn_endpoint("400 Bad Request", "{\"error\": \"bad\"}", hits.clone()).await;

    let client = LlmClient::new(options(vec![e1.clone()], 3)).unwrap();
    let err = client.complete("prompt").await.unwrap_err();

    assert_eq!(err.kind(), "llm_unavailable");
    // one attempt, no retries for a client error
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_status_is_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let e1 = spawn_endpoint("429 Too Many Requests", "{}", hits.clone()).await;

    let client = LlmClient::new(options(vec![e1], 2)).unwrap();
    let err = client.complete("prompt").await.unwrap_err();

    assert_eq!(err.kind(), "llm_unavailable");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
