//! TCP connection establishment.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::timeouts::with_deadline;

/// Connect to `addr` (`host:port`), bounded by `timeout`.
pub async fn connect(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let stream = with_deadline(
        timeout,
        async {
            TcpStream::connect(addr)
                .await
                .map_err(|e| Error::connection(format!("failed to connect to {}: {}", addr, e)))
        },
        Error::ConnectTimeout,
    )
    .await?;

    // Small request writes (CONNECT, headers) should not wait on Nagle.
    stream
        .set_nodelay(true)
        .map_err(|e| Error::connection(format!("failed to set TCP_NODELAY: {}", e)))?;
    Ok(stream)
}
