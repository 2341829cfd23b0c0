//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use summarizer_proxy::config::ProxyConfig;
use summarizer_proxy::credentials::{Credential, CredentialError, CredentialProvider};

/// What a mock backend answers with.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16, content_type: Option<&'static str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn json(body: &str) -> Self {
        Self::new(200, Some("application/json"), body)
    }
}

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Handle on a running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Start a mock backend that always returns the same response.
pub async fn start_mock_backend(response: MockResponse) -> MockBackend {
    start_programmable_backend(move || {
        let response = response.clone();
        async move { response }
    })
    .await
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (task_calls, task_requests) = (calls.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let calls = task_calls.clone();
            let requests = task_requests.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                calls.fetch_add(1, Ordering::SeqCst);
                requests.lock().unwrap().push(request);

                let response = f().await;
                let mut head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    response.status,
                    reason(response.status),
                    response.body.len()
                );
                if let Some(ct) = response.content_type {
                    head.push_str(&format!("Content-Type: {}\r\n", ct));
                }
                head.push_str("\r\n");

                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&response.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockBackend {
        addr,
        calls,
        requests,
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        head,
        body: buf[head_end..].to_vec(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Credential provider returning a fixed token and counting mints.
pub struct StaticProvider {
    pub token: &'static str,
    calls: AtomicU32,
}

impl StaticProvider {
    pub fn new(token: &'static str) -> Arc<Self> {
        Arc::new(Self {
            token,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn credential(&self, audience: &str) -> Result<Credential, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(self.token.to_string(), audience))
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

/// Default config pointed at `backend`.
pub fn config_for(backend: &MockBackend) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backend.url = Some(backend.url());
    config
}

/// Run a future with a generous upper bound so a hang fails the test.
pub async fn bounded<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(15), fut)
        .await
        .expect("test step timed out")
}
