//! Loopback playback server.
//!
//! A plain file server over the items directory. Completed files appear
//! via atomic rename, so a request never observes a partial write; range
//! requests are handled by `ServeDir`, which HLS players rely on for
//! seeking.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Handle to the running server. The bound port is chosen once and stays
/// stable for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct PlaybackServer {
    addr: SocketAddr,
}

impl PlaybackServer {
    /// Bind `127.0.0.1:<port>` (0 = ephemeral) and serve `items_root`.
    pub async fn start(items_root: PathBuf, port: u16) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;

        let app = Router::new().fallback_service(ServeDir::new(items_root));
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                warn!(%error, "playback server exited");
            }
        });

        info!(%addr, "playback server listening");
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
