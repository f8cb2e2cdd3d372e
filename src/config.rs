//! CLI arguments and server configuration defaults.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::envelope::EnvelopeStyle;
use crate::upload::UploadConfig;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ASSETS_DIR: &str = "assets";
pub const DEFAULT_STATIC_PREFIX: &str = "/static";
pub const DEFAULT_FORM_FIELD: &str = "file";
pub const DEFAULT_SUBDIR_HEADER: &str = "subdir";
pub const DEFAULT_TOKEN_HEADER: &str = "accesstoken";
pub const DEFAULT_AUTH_USER: &str = "admin";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedrop", version, about = "Date-bucketed file upload server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "FILEDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(
        short = 'a',
        long,
        env = "FILEDROP_ASSETS_DIR",
        default_value = DEFAULT_ASSETS_DIR,
        help = "Root directory for uploaded files"
    )]
    pub assets_dir: String,
    #[arg(
        long,
        env = "FILEDROP_STATIC_PREFIX",
        default_value = DEFAULT_STATIC_PREFIX,
        help = "URL prefix that serves uploaded files"
    )]
    pub static_prefix: String,
    #[arg(
        long,
        env = "FILEDROP_FORM_FIELD",
        default_value = DEFAULT_FORM_FIELD,
        help = "Multipart field carrying the uploaded file"
    )]
    pub form_field: String,
    #[arg(
        long,
        env = "FILEDROP_SUBDIR_HEADER",
        default_value = DEFAULT_SUBDIR_HEADER,
        help = "Request header with the optional upload subdirectory"
    )]
    pub subdir_header: String,
    #[arg(
        long,
        env = "FILEDROP_TOKEN_HEADER",
        default_value = DEFAULT_TOKEN_HEADER,
        help = "Request header carrying the access token"
    )]
    pub token_header: String,
    #[arg(
        long = "no-auth",
        env = "FILEDROP_NO_AUTH",
        action = clap::ArgAction::SetTrue,
        help = "Disable /login and token checks on /upload"
    )]
    pub no_auth: bool,
    #[arg(
        long,
        env = "FILEDROP_AUTH_USER",
        default_value = DEFAULT_AUTH_USER,
        help = "Login username"
    )]
    pub username: String,
    #[arg(long, env = "FILEDROP_AUTH_PASS", help = "Login password")]
    pub password: Option<String>,
    #[arg(long, env = "FILEDROP_JWT_SECRET", help = "Token signing secret")]
    pub jwt_secret: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_TOKEN_TTL_SECS",
        default_value_t = DEFAULT_TOKEN_TTL_SECS,
        help = "Token lifetime in seconds"
    )]
    pub token_ttl_secs: u64,
    #[arg(
        long,
        env = "FILEDROP_ENVELOPE_FIELD",
        value_enum,
        default_value_t = EnvelopeStyle::Code,
        help = "Name of the status field in JSON responses"
    )]
    pub envelope_field: EnvelopeStyle,
    #[arg(
        long,
        env = "FILEDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max request body size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(long, env = "FILEDROP_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(short = 'c', long, env = "FILEDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "FILEDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
}

impl Args {
    pub fn assets_root(&self) -> PathBuf {
        PathBuf::from(&self.assets_dir)
    }

    pub fn upload_config(&self) -> io::Result<UploadConfig> {
        Ok(UploadConfig {
            form_field: self.form_field.clone(),
            subdir_header: self.subdir_header.clone(),
            static_prefix: normalize_static_prefix(&self.static_prefix)?,
            max_body_size: self.upload_max_size,
        })
    }

    /// Returns `None` when auth is disabled.
    pub fn auth_config(&self) -> io::Result<Option<AuthConfig>> {
        if self.no_auth {
            return Ok(None);
        }
        let password = self
            .password
            .clone()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| invalid_input("--password is required when auth is enabled"))?;
        let secret = self
            .jwt_secret
            .clone()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| invalid_input("--jwt-secret is required when auth is enabled"))?;
        Ok(Some(AuthConfig {
            username: self.username.clone(),
            password,
            secret,
            token_ttl: Duration::from_secs(self.token_ttl_secs),
            token_header: self.token_header.clone(),
        }))
    }
}

/// Trims trailing slashes; the prefix must be rooted and cannot be `/` itself.
pub fn normalize_static_prefix(prefix: &str) -> io::Result<String> {
    let trimmed = prefix.trim().trim_end_matches('/');
    if !trimmed.starts_with('/') {
        return Err(invalid_input("static prefix must start with '/'"));
    }
    Ok(trimmed.to_string())
}

fn invalid_input(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.to_string())
}
