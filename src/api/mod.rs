pub mod handlers;
pub mod models;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tracing::info;

use crate::command::Dispatcher;
use crate::config::ApiConfig;

use handlers::AppState;

/// 构建路由；配置了 secret 时挂载认证中间件
pub fn router(dispatcher: Arc<Dispatcher>, secret: Option<String>) -> axum::Router {
    let state = AppState { dispatcher };

    let mut app = axum::Router::new()
        .route("/version", get(handlers::get_version))
        .route("/command", post(handlers::post_command));

    if let Some(secret) = secret {
        app = app.layer(middleware::from_fn(move |req, next| {
            auth_middleware(req, next, secret.clone())
        }));
    }

    app.with_state(state)
}

/// 启动 HTTP 命令通道
pub fn start(config: &ApiConfig, dispatcher: Arc<Dispatcher>) -> Result<JoinHandle<()>> {
    let app = router(dispatcher, config.secret.clone());

    let bind_addr = format!("{}:{}", config.listen, config.port);
    info!(addr = bind_addr, "API server starting");

    let handle = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(addr = bind_addr, error = %e, "API server bind failed");
                return;
            }
        };
        info!(addr = bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(handle)
}

/// Bearer token 认证中间件
async fn auth_middleware(req: Request, next: Next, secret: String) -> Result<Response, StatusCode> {
    // /version 端点不需要认证
    if req.uri().path() == "/version" {
        return Ok(next.run(req).await);
    }

    if let Some(auth) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                if token == secret {
                    return Ok(next.run(req).await);
                }
            }
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}
