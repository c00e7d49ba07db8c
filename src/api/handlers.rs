use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tracing::error;

use crate::command::Dispatcher;

use super::models::{CommandResponse, VersionResponse};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// GET /version
pub async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /command，请求体即原始命令 JSON
///
/// 求值可能读写文件、跑满步数预算，放到阻塞线程池执行。
pub async fn post_command(State(state): State<AppState>, body: String) -> Response {
    let dispatcher = state.dispatcher.clone();
    let outcome = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&body)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "command task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match outcome.into_parts() {
        Some((result, kind)) => {
            (StatusCode::OK, Json(CommandResponse { result, kind })).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
