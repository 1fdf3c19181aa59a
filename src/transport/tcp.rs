//! TCP connection to the transmitter.
//!
//! # Example
//!
//! ```ignore
//! use lrsn_client::transport::connect;
//!
//! let stream = connect("192.168.1.50", 3700, Duration::from_secs(10)).await?;
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpSocket, TcpStream};

use crate::error::{LrsnError, Result};

/// Connect to `host:port`, trying every resolved address in turn.
///
/// # Errors
///
/// - [`LrsnError::Socket`] if a local socket cannot be created. This is the
///   only error the caller should treat as fatal.
/// - [`LrsnError::Connect`] if resolution fails, every address refuses, or
///   the attempt exceeds `connect_timeout`.
pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let target = format!("{}:{}", host, port);

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| LrsnError::Connect {
            addr: target.clone(),
            source,
        })?
        .collect();

    let mut last_error =
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");

    for addr in addrs {
        let socket = new_socket(addr)?;

        match tokio::time::timeout(connect_timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!("Connect to {} failed: {}", addr, e);
                last_error = e;
            }
            Err(_) => {
                tracing::debug!("Connect to {} timed out after {:?}", addr, connect_timeout);
                last_error = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", connect_timeout),
                );
            }
        }
    }

    Err(LrsnError::Connect {
        addr: target,
        source: last_error,
    })
}

/// Create a stream socket with `SO_REUSEADDR` set.
fn new_socket(addr: SocketAddr) -> Result<TcpSocket> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(LrsnError::Socket)?;

    socket.set_reuseaddr(true).map_err(LrsnError::Socket)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (stream, accepted) = tokio::join!(
            connect("127.0.0.1", port, Duration::from_secs(5)),
            listener.accept()
        );

        assert!(stream.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            LrsnError::Connect { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{}", port)),
            other => panic!("expected connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_connect_error() {
        let err = connect("host.invalid", 3700, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LrsnError::Connect { .. }));
    }
}
