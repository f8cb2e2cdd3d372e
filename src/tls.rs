//! TLS 证书加载。

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use tokio::fs;
use tracing::info;

/// 读取 PEM 证书与私钥构建 Rustls 配置。
pub async fn build_rustls_config(cert_path: &str, key_path: &str) -> io::Result<RustlsConfig> {
    let cert = fs::read(cert_path).await?;
    let key = fs::read(key_path).await?;
    info!(cert = cert_path, "loaded tls certificate");
    RustlsConfig::from_pem(cert, key).await
}
