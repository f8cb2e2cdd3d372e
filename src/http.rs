//! HTTP 辅助工具：跨域、响应安全头与客户端地址。

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderName, HeaderValue, Method, Request, header};
use std::net::{IpAddr, SocketAddr};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

/// 跨域配置：只放行上传/登录用到的方法与请求头（含子目录头、令牌头）。
pub fn build_cors_layer(cors_origins: Option<&str>, request_headers: &[&str]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = cors_origins?
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(origin, "invalid cors origin"))
                .ok()
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    let mut allowed = vec![header::CONTENT_TYPE];
    for name in request_headers {
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => allowed.push(name),
            Err(_) => warn!(header = name, "invalid header name for cors"),
        }
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(allowed),
    )
}

/// 为所有响应（含静态文件）补充基础安全头。
pub fn with_security_headers(router: Router) -> Router {
    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}

/// 客户端地址：优先反向代理的 `x-forwarded-for` 首跳，其次连接地址。
pub fn client_ip<B>(request: &Request<B>) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    let connected = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    forwarded
        .or(connected)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
