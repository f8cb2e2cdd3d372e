//! 路由装配：上传、登录与静态文件服务。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::any;
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::auth::{self, AuthConfig};
use crate::envelope::EnvelopeStyle;
use crate::http::{client_ip, with_security_headers};
use crate::storage::Storage;
use crate::upload::{self, UploadConfig};

/// 各处理器共享的只读配置。
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub upload: Arc<UploadConfig>,
    pub auth: Option<Arc<AuthConfig>>,
    pub envelope: EnvelopeStyle,
}

pub fn build_router(state: AppState) -> Router {
    let AppState {
        storage,
        upload,
        auth,
        envelope,
    } = state;

    let mut upload_route = any(upload::upload_file);
    if auth.is_some() {
        upload_route = upload_route.layer(middleware::from_fn(auth::validate_token));
    }

    let mut app = Router::new()
        .route("/upload", upload_route)
        .nest_service(&upload.static_prefix, ServeDir::new(storage.root_path()));
    if auth.is_some() {
        app = app.route("/login", any(auth::login));
    }

    let body_limit = match upload.max_body_size {
        0 => DefaultBodyLimit::disable(),
        max => DefaultBodyLimit::max(usize::try_from(max).unwrap_or(usize::MAX)),
    };

    let mut app = with_security_headers(app.layer(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(upload))
        .layer(Extension(envelope));
    if let Some(auth) = auth {
        app = app.layer(Extension(auth));
    }
    app
}

/// 启动时打印路由表。
pub fn log_routes(state: &AppState) {
    info!(
        method = "GET",
        path = format!("{}/*", state.upload.static_prefix),
        "serve uploaded files"
    );
    if let Some(auth) = &state.auth {
        info!(method = "POST", path = "/login", username = auth.username, "login");
    }
    info!(
        method = "POST",
        path = "/upload",
        field = state.upload.form_field,
        auth = state.auth.is_some(),
        "upload file"
    );
}
