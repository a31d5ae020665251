//! Share server lifecycle.
//!
//! Probes for a free port, serves the router until cancelled, then drains
//! in-flight requests.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use webshare_delivery::TransferQueue;

use crate::handlers::{self, AppState};
use crate::{DEFAULT_MAX_CHUNK_BYTES, ServerError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    /// First port to try (0 = OS-assigned, no probing).
    pub port: u16,
    /// Last port to try when the earlier ones are taken.
    pub port_range_end: u16,
    /// Root for uploads; created on startup.
    pub upload_dir: PathBuf,
    /// Static assets served for unmatched paths.
    pub static_dir: Option<PathBuf>,
    pub max_chunk_bytes: usize,
    /// Cap on `/upload` bodies; `None` streams without limit.
    pub max_upload_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            port_range_end: 60000,
            upload_dir: PathBuf::from("uploads"),
            static_dir: Some(PathBuf::from("statics")),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            max_upload_bytes: None,
        }
    }
}

/// The webshare HTTP server.
pub struct ShareServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
}

impl ShareServer {
    /// Creates a server that delivers from `queue`.
    ///
    /// The caller keeps its own handle on the queue to enqueue paths while
    /// the server runs.
    pub fn new(config: ServerConfig, queue: Arc<TransferQueue>) -> Arc<Self> {
        let state = AppState::new(queue, &config.upload_dir);
        Arc::new(Self {
            config,
            state,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The application router, without a listener.
    pub fn router(&self) -> Router {
        handlers::router(self.state.clone(), &self.config)
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    ///
    /// Creates the upload directory, binds the first free port in the
    /// configured range and serves until cancelled.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        tokio::fs::create_dir_all(&self.config.upload_dir).await?;

        let listener = bind_first_available(
            self.config.bind_address,
            self.config.port,
            self.config.port_range_end,
        )
        .await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            upload_dir = %self.config.upload_dir.display(),
            "share server listening on http://{local_addr}"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned())
            .await?;

        tracing::info!("server shutting down");
        Ok(())
    }
}

/// Binds the first port in `start..=end` that is not already in use.
///
/// A `start` of 0 binds an OS-assigned port. Errors other than
/// "address in use" abort the search.
pub async fn bind_first_available(
    ip: IpAddr,
    start: u16,
    end: u16,
) -> Result<TcpListener, ServerError> {
    if start == 0 {
        return Ok(TcpListener::bind((ip, 0)).await?);
    }

    for port in start..=end.max(start) {
        match TcpListener::bind((ip, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "port in use, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ServerError::NoAvailablePort { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn bind_skips_taken_port() {
        let taken = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port > u16::MAX - 20 {
            return;
        }

        let listener = bind_first_available(LOCALHOST, port, port + 20)
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn bind_fails_when_range_exhausted() {
        let taken = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = bind_first_available(LOCALHOST, port, port).await;
        assert!(matches!(result, Err(ServerError::NoAvailablePort { .. })));
    }

    async fn wait_for_port(server: &ShareServer) -> u16 {
        for _ in 0..200 {
            let port = server.port().await;
            if port != 0 {
                return port;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server never bound");
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            bind_address: LOCALHOST,
            port: 0,
            upload_dir: dir.path().join("uploads"),
            static_dir: None,
            ..ServerConfig::default()
        };
        let server = ShareServer::new(config, Arc::new(TransferQueue::new()));

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };
        let port = wait_for_port(&server).await;
        assert_eq!(server.config().upload_dir, dir.path().join("uploads"));
        assert!(dir.path().join("uploads").is_dir());
        assert!(matches!(server.run().await, Err(ServerError::AlreadyRunning)));

        let mut stream = tokio::net::TcpStream::connect((LOCALHOST, port)).await.unwrap();
        stream
            .write_all(b"GET /check-file HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.ends_with(r#"{"fileAvailable":false}"#));

        server.shutdown();
        task.await.unwrap().unwrap();
    }
}
