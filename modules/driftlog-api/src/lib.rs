pub mod handlers;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub use storage::{user_subdir, StorageError, UserFiles, MAX_FILE_BYTES};

pub struct AppState {
    pub data_dir: PathBuf,
    pub max_file_bytes: u64,
    /// Serializes read-modify-write cycles on the data files.
    pub write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_file_bytes: MAX_FILE_BYTES,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn files(&self, user: &str) -> UserFiles {
        UserFiles::new(&self.data_dir, user, self.max_file_bytes)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/stream", post(handlers::stream))
        .route("/bulk", post(handlers::bulk))
        .route("/list", get(handlers::list))
        .route("/reset", post(handlers::reset))
        .route("/time", get(handlers::time))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path only (the query carries the user id)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Serve the lab API on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
