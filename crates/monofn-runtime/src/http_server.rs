//! HTTP Server for the runtime
//!
//! Serves JSON-RPC `POST /` and `GET /__health` with axum. Each connection is
//! served on its own task and handler calls run on the blocking pool, so a slow
//! handler never delays accepting or answering other requests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use monofn_common::transport::{HttpTransport, HyperResponse};
use monofn_common::MonofnError;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::http_router::RuntimeRouter;
use crate::worker::Worker;

pub struct RuntimeServer {
    router: Arc<RuntimeRouter>,
}

impl RuntimeServer {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self {
            router: Arc::new(RuntimeRouter::new(worker)),
        }
    }

    /// Builds the axum application.
    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .route("/", axum::routing::post(handle_jsonrpc))
            .route("/__health", axum::routing::get(health_check))
            .layer(CorsLayer::permissive())
            .with_state(self.router.clone())
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), MonofnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app();
        info!(
            "Runtime HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| MonofnError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| MonofnError::Transport(format!("Server error: {}", e)))
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<(), MonofnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MonofnError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }
}

async fn handle_jsonrpc(State(router): State<Arc<RuntimeRouter>>, body: Bytes) -> HyperResponse {
    let request = match HttpTransport::parse_jsonrpc(body) {
        Ok(request) => request,
        Err(response) => {
            warn!("Rejected malformed JSON-RPC request");
            return HttpTransport::to_http_response(response);
        }
    };

    HttpTransport::to_http_response(router.handle_request(request).await)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
