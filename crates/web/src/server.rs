//! Static HTTP server for the harness page

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use mocharun_common::config::ServerConfig;
use mocharun_common::{Error, Result};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::static_files::StaticFiles;

/// Build the router serving `files`
pub fn router(files: StaticFiles) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/*path", get(file_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(files))
}

async fn index_handler(State(files): State<Arc<StaticFiles>>) -> Response {
    files.serve("").await
}

async fn file_handler(State(files): State<Arc<StaticFiles>>, Path(path): Path<String>) -> Response {
    files.serve(&path).await
}

/// A running static server.
///
/// The server lives for the duration of one run; dropping the handle stops it.
pub struct StaticServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl StaticServer {
    /// Bind the configured address and start serving in the background.
    ///
    /// Fails with [`Error::ServerBind`] when the address is already in use.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let files = StaticFiles::new(&config.root).map_err(|e| {
            Error::InvalidConfig(format!(
                "server root {} is not usable: {}",
                config.root.display(),
                e
            ))
        })?;

        let addr = config.addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::ServerBind { addr, source })?;
        let addr = listener.local_addr()?;

        info!(
            "Serving {} on http://{}",
            files.root().display(),
            addr
        );

        let app = router(files);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Static server stopped: {}", e);
            }
        });

        Ok(Self { addr, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a path under the server root
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
