//! Control-signal broadcaster (C6): fan-out `JOB_FINISHED` to every target
//! consumer endpoint with independent per-target failure (spec.md §4.6).

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::wire::{CMD_JOB_FINISHED, CONTROL_MAGIC};

/// Outcome for one endpoint. Never fatal to the overall broadcast.
#[derive(Debug)]
pub struct EndpointResult {
    pub endpoint: String,
    pub ok: bool,
}

/// Sends `JOB_FINISHED` to every endpoint concurrently, each under its own
/// timeout, and returns once all attempts have settled. A per-endpoint
/// failure never cancels the others (spec.md §4.6).
pub async fn broadcast_job_finished(
    endpoints: &[String],
    qid: &str,
    token: &str,
    per_endpoint_timeout: Duration,
) -> Vec<EndpointResult> {
    let mut handles = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let endpoint = endpoint.clone();
        let qid = qid.to_string();
        let token = token.to_string();
        handles.push(tokio::spawn(async move {
            let ok = timeout(per_endpoint_timeout, send_one(&endpoint, &qid, &token))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
            if ok {
                info!(%endpoint, %qid, "JOB_FINISHED delivered");
            } else {
                warn!(%endpoint, %qid, "JOB_FINISHED delivery failed or timed out");
            }
            EndpointResult { endpoint, ok }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(r) => results.push(r),
            Err(_) => results.push(EndpointResult {
                endpoint: "unknown".into(),
                ok: false,
            }),
        }
    }
    results
}

async fn send_one(endpoint: &str, qid: &str, token: &str) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(endpoint).await?;

    let mut buf = Vec::new();
    buf.extend_from_slice(&(token.len() as u32).to_be_bytes());
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(&CONTROL_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(qid.len() as u32).to_be_bytes());
    buf.extend_from_slice(qid.as_bytes());
    buf.extend_from_slice(&CMD_JOB_FINISHED.to_be_bytes());

    stream.write_all(&buf).await?;

    let mut ack = [0u8; 2];
    let _ = stream.read_exact(&mut ack).await; // best-effort; ignored per spec
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn delivers_to_a_live_endpoint_and_fails_the_dead_one() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = sock.read(&mut buf).await.unwrap();
            buf.truncate(n);
            let _ = sock.write_all(b"OK").await;
            buf
        });

        let results = broadcast_job_finished(
            &[addr.clone(), "127.0.0.1:1".to_string()],
            "q1",
            "dyn-tok",
            Duration::from_millis(500),
        )
        .await;

        let live = results.iter().find(|r| r.endpoint == addr).unwrap();
        assert!(live.ok);
        let dead = results.iter().find(|r| r.endpoint != addr).unwrap();
        assert!(!dead.ok);

        let received = server.await.unwrap();
        assert!(received.ends_with(&CMD_JOB_FINISHED.to_be_bytes()));
        assert!(received.windows(2).any(|w| w == b"q1"));
    }
}
