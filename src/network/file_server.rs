// Transient HTTP server the device pulls the firmware image from.
//
// Serves plain file names from one directory, streamed in 64 KiB chunks.
// The server runs as a background task and is stopped through its
// cancellation token; `shutdown` bounds how long in-flight downloads may
// keep it alive.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::validators;
use crate::error::{OtaError, Result};
use crate::progress::Reporter;

pub const SERVE_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct ServeState {
    root: PathBuf,
    reporter: Arc<dyn Reporter>,
}

/// A running file server. Stop it with [`ServeSession::shutdown`].
pub struct ServeSession {
    addr: SocketAddr,
    token: CancellationToken,
    task: Option<JoinHandle<io::Result<()>>>,
    reporter: Arc<dyn Reporter>,
    grace: Duration,
}

impl ServeSession {
    /// Bind `bind` (port 0 for an ephemeral port) and serve `root` in the background.
    pub async fn start(root: &Path, bind: SocketAddr, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let root = tokio::fs::canonicalize(root).await.map_err(OtaError::Server)?;
        let listener = TcpListener::bind(bind).await.map_err(OtaError::Server)?;
        let addr = listener.local_addr().map_err(OtaError::Server)?;

        let state = Arc::new(ServeState {
            root: root.clone(),
            reporter: reporter.clone(),
        });
        let app = Router::new()
            .route("/:file", get(serve_file))
            .with_state(state);

        let token = CancellationToken::new();
        let stop = token.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        log::info!("File server listening on {} (root {})", addr, root.display());

        Ok(Self {
            addr,
            token,
            task: Some(task),
            reporter,
            grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// How long `shutdown` waits for in-flight downloads before aborting.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting, let downloads finish within the grace period, then abort.
    pub async fn shutdown(mut self) {
        log::info!("Shutting down HTTP server...");
        self.token.cancel();

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.grace, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => log::warn!("File server exited with error: {}", e),
                Ok(Err(e)) => log::warn!("File server task failed: {}", e),
                Err(_) => {
                    log::warn!("File server still busy after {:?}, aborting", self.grace);
                    task.abort();
                }
            }
        }

        self.reporter.server_stopped();
    }
}

impl Drop for ServeSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.token.cancel();
            task.abort();
        }
    }
}

async fn serve_file(
    State(state): State<Arc<ServeState>>,
    method: Method,
    UrlPath(name): UrlPath<String>,
) -> Response {
    if let Err(e) = validators::validate_filename(&name) {
        log::warn!("Rejected request for '{}': {}", name, e);
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let Some(path) = resolve(&state.root, &name).await else {
        log::warn!("Request for unknown file '{}'", name);
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            log::error!("Failed to open {}: {}", path.display(), e);
            return (StatusCode::NOT_FOUND, "not found").into_response();
        }
    };
    let len = match file.metadata().await {
        Ok(m) => m.len(),
        Err(e) => {
            log::error!("Failed to stat {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        log::info!("Serving {} ({} bytes)", name, len);
        let mut progress = state.reporter.transfer_started(&name, len);
        let stream = ReaderStream::with_capacity(file, SERVE_CHUNK_SIZE).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                progress.advance(bytes.len() as u64);
            }
            chunk
        });
        Body::from_stream(stream)
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        body,
    )
        .into_response()
}

/// Path of `name` if it is a direct entry of `root` naming a regular file.
/// `name` is a single validated segment; a symlinked entry is followed.
async fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    let path = root.join(name);
    if path.parent() != Some(root) {
        return None;
    }
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    metadata.is_file().then_some(path)
}
