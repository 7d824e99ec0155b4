use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Minimal HTTP CONNECT proxy.
///
/// Records every request head it receives. When `reject_with` is set it
/// answers each CONNECT with that status instead of opening a tunnel.
pub struct MockConnectProxy {
    addr: SocketAddr,
    heads: Arc<Mutex<Vec<String>>>,
}

impl MockConnectProxy {
    /// Tunnelling proxy on a random port.
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Proxy that refuses every CONNECT with `status`.
    pub async fn rejecting(status: u16) -> Self {
        Self::spawn(Some(status)).await
    }

    async fn spawn(reject_with: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let heads = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&heads);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, log, reject_with).await {
                        tracing::debug!("mock proxy connection ended: {}", e);
                    }
                });
            }
        });

        Self { addr, heads }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request heads received so far, oldest first.
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    /// CONNECT targets received so far.
    pub fn targets(&self) -> Vec<String> {
        self.heads()
            .iter()
            .filter_map(|head| {
                let line = head.lines().next()?;
                let mut parts = line.split(' ');
                match parts.next() {
                    Some("CONNECT") => parts.next().map(str::to_string),
                    _ => None,
                }
            })
            .collect()
    }
}

async fn handle(
    mut client: TcpStream,
    log: Arc<Mutex<Vec<String>>>,
    reject_with: Option<u16>,
) -> std::io::Result<()> {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = client.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        received.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&received).into_owned();
    log.lock().unwrap().push(head.clone());

    if let Some(status) = reject_with {
        let reply = format!("HTTP/1.1 {} Rejected\r\nContent-Length: 0\r\n\r\n", status);
        client.write_all(reply.as_bytes()).await?;
        return client.shutdown().await;
    }

    let target = head
        .lines()
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .unwrap_or_default()
        .to_string();
    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(_) => {
            client
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                .await?;
            return client.shutdown().await;
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
