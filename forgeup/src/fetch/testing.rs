//! Minimal HTTP/1.1 responder for transport tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One canned response.
#[derive(Clone)]
pub struct Route {
    path: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Route {
    pub fn ok(path: &str, body: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Serves the given routes on an ephemeral port until dropped.
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_headers: Arc<Mutex<Vec<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let last_headers = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let handle = {
            let hits = Arc::clone(&hits);
            let last_headers = Arc::clone(&last_headers);
            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let routes = Arc::clone(&routes);
                    let hits = Arc::clone(&hits);
                    let last_headers = Arc::clone(&last_headers);
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }
                        hits.fetch_add(1, Ordering::SeqCst);

                        let request = String::from_utf8_lossy(&buf).into_owned();
                        let mut lines = request.lines();
                        let path = lines
                            .next()
                            .and_then(|l| l.split_whitespace().nth(1))
                            .unwrap_or("/")
                            .to_string();
                        *last_headers.lock().unwrap() = lines
                            .take_while(|l| !l.is_empty())
                            .map(str::to_string)
                            .collect();

                        let route = routes.iter().find(|r| r.path == path);
                        let (status, headers, body) = match route {
                            Some(r) => (r.status, r.headers.clone(), r.body.clone()),
                            None => (404, Vec::new(), b"not found".to_vec()),
                        };

                        let mut response = format!(
                            "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n",
                            status,
                            body.len()
                        );
                        for (name, value) in headers {
                            response.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        response.push_str("\r\n");

                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                        let _ = socket.shutdown().await;
                    });
                }
            })
        };

        Self {
            addr,
            hits,
            last_headers,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request_headers(&self) -> Vec<String> {
        self.last_headers.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
