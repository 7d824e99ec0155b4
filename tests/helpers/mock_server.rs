use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use super::tls::acceptor_with_alpn;

/// One request as the origin saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// "h2" or "http/1.1".
    pub protocol: String,
    pub path: String,
    pub range: Option<String>,
    pub user_agent: Option<String>,
}

/// TLS file server that honours `Range: bytes=N-`.
///
/// It speaks whichever of h2 and http/1.1 ALPN selected, so one server covers
/// both branches of the client.
pub struct MockFileServer {
    port: u16,
    ca_pem: Vec<u8>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// Behaviour knobs for [`MockFileServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Server ALPN preference in wire format.
    pub alpn: &'static [u8],
    /// Cut the first HTTP/1.1 connection after this many body bytes.
    pub truncate_first: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            alpn: b"\x02h2\x08http/1.1",
            truncate_first: None,
        }
    }
}

impl MockFileServer {
    pub async fn start(payload: Vec<u8>, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (acceptor, ca_pem) = acceptor_with_alpn(options.alpn);
        let acceptor = Arc::new(acceptor);
        let payload = Bytes::from(payload);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = Arc::clone(&acceptor);
                let payload = payload.clone();
                let log = Arc::clone(&log);
                let index = connections.fetch_add(1, Ordering::SeqCst);
                let truncate = options.truncate_first.filter(|_| index == 0);

                tokio::spawn(async move {
                    let stream = match tokio_boring::accept(&acceptor, tcp).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!("mock server handshake failed: {}", e);
                            return;
                        }
                    };
                    let h2 = stream.ssl().selected_alpn_protocol() == Some(b"h2".as_slice());
                    if h2 {
                        serve_h2(stream, payload, log).await;
                    } else {
                        serve_h1(stream, payload, log, truncate).await;
                    }
                });
            }
        });

        Self { port, ca_pem, seen }
    }

    /// URL of `path` on this server, addressed by name so SNI and the
    /// certificate line up.
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.port, path)
    }

    pub fn authority(&self) -> String {
        format!("localhost:{}", self.port)
    }

    pub fn ca_pem(&self) -> &[u8] {
        &self.ca_pem
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Status, extra headers and body for a request with `range`.
fn plan(payload: &Bytes, range: Option<&str>) -> (u16, Vec<(String, String)>, Bytes) {
    let total = payload.len();
    let start = range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);

    if start == 0 {
        (200, Vec::new(), payload.clone())
    } else if start >= total {
        (
            416,
            vec![("content-range".into(), format!("bytes */{}", total))],
            Bytes::new(),
        )
    } else {
        (
            206,
            vec![(
                "content-range".into(),
                format!("bytes {}-{}/{}", start, total - 1, total),
            )],
            payload.slice(start..),
        )
    }
}

async fn serve_h1<S>(
    mut stream: S,
    payload: Bytes,
    log: Arc<Mutex<Vec<SeenRequest>>>,
    truncate: Option<usize>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&received).into_owned();
    let header = |name: &str| {
        head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    };
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .unwrap_or("/")
        .to_string();
    let range = header("range");
    log.lock().unwrap().push(SeenRequest {
        protocol: "http/1.1".into(),
        path,
        range: range.clone(),
        user_agent: header("user-agent"),
    });

    let (status, extra, body) = plan(&payload, range.as_deref());
    let mut response = format!("HTTP/1.1 {} Mock\r\nContent-Length: {}\r\n", status, body.len());
    for (k, v) in extra {
        response.push_str(&format!("{}: {}\r\n", k, v));
    }
    response.push_str("\r\n");
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    match truncate {
        Some(cut) => {
            let cut = cut.min(body.len());
            let _ = stream.write_all(&body[..cut]).await;
            let _ = stream.flush().await;
            // Dropped without close_notify: the client sees a short body.
        }
        None => {
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
    }
}

async fn serve_h2<S>(stream: S, payload: Bytes, log: Arc<Mutex<Vec<SeenRequest>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = match h2::server::handshake(stream).await {
        Ok(conn) => conn,
        Err(_) => return,
    };

    while let Some(result) = conn.accept().await {
        let (request, mut respond) = match result {
            Ok(pair) => pair,
            Err(_) => return,
        };
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let range = header("range");
        log.lock().unwrap().push(SeenRequest {
            protocol: "h2".into(),
            path: request.uri().path().to_string(),
            range: range.clone(),
            user_agent: header("user-agent"),
        });

        let (status, extra, body) = plan(&payload, range.as_deref());
        let mut builder = http::Response::builder()
            .status(status)
            .header("content-length", body.len());
        for (k, v) in extra {
            builder = builder.header(k, v);
        }
        let response = builder.body(()).unwrap();

        if body.is_empty() {
            let _ = respond.send_response(response, true);
        } else if let Ok(mut send) = respond.send_response(response, false) {
            let _ = send.send_data(body, true);
        }
    }
}
