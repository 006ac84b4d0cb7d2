//! HTTP 服务与网页界面

mod handlers;

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::joycaption::{predictor::SharedModel, stream::DEFAULT_STREAM_TIMEOUT};

/// 请求体上限, 图片以 base64 放在 JSON 中
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub model: SharedModel,
    pub stream_timeout: Duration,
}

impl AppState {
    pub fn new(model: SharedModel) -> Self {
        Self {
            model,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    pub fn with_stream_timeout(mut self, stream_timeout: Duration) -> Self {
        self.stream_timeout = stream_timeout;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/options", get(handlers::options))
        .route("/api/prompt", post(handlers::prompt))
        .route("/api/caption", post(handlers::caption))
        .route("/api/batch", post(handlers::batch))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// 启动服务, Ctrl+C 退出
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
