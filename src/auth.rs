//! 登录签发 JWT 与上传接口的令牌校验中间件。

use axum::body::Body as AxumBody;
use axum::extract::rejection::FormRejection;
use axum::extract::{Extension, Form, FromRequest, Multipart};
use axum::http::{Method, Request};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::envelope::{Envelope, EnvelopeStyle};
use crate::error::ApiError;
use crate::upload::UploadConfig;

/// 单用户、单密钥的认证配置。
#[derive(Debug)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub secret: String,
    pub token_ttl: Duration,
    pub token_header: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// 已通过校验的令牌主体，写入请求扩展。
#[derive(Clone, Debug)]
pub struct AuthSubject(pub String);

#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 为配置中的用户签发 HS256 令牌。
pub fn issue_token(auth: &AuthConfig, now: DateTime<Utc>) -> Result<IssuedToken, ApiError> {
    let ttl = chrono::Duration::from_std(auth.token_ttl)
        .map_err(|err| ApiError::TokenGenerationFailed(err.to_string()))?;
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| ApiError::TokenGenerationFailed("token ttl overflow".into()))?;
    let claims = Claims {
        sub: auth.username.clone(),
        exp: expires_at.timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.secret.as_bytes()),
    )
    .map_err(|err| ApiError::TokenGenerationFailed(err.to_string()))?;
    Ok(IssuedToken { token, expires_at })
}

/// 校验签名与过期时间，过期即拒绝，不留宽限。
pub fn verify_token(auth: &AuthConfig, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// 登录接口：校验账号密码并返回 `{token, expire}`。
pub async fn login(
    method: Method,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(style): Extension<EnvelopeStyle>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Envelope {
    style.wrap(login_inner(&method, &auth, form))
}

fn login_inner(
    method: &Method,
    auth: &AuthConfig,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<serde_json::Value, ApiError> {
    if *method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }
    let Ok(Form(form)) = form else {
        return Err(ApiError::InvalidCredentials);
    };
    if form.username != auth.username || form.password != auth.password {
        return Err(ApiError::InvalidCredentials);
    }

    let issued = issue_token(auth, Utc::now())?;
    info!(username = auth.username, expires_at = %issued.expires_at, "login succeeded");
    Ok(json!({
        "token": issued.token,
        "expire": issued.expires_at.timestamp() * 1000,
    }))
}

/// 令牌校验中间件。拒绝前先读完表单文件，避免请求体未被消费。
pub async fn validate_token(
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    Extension(style): Extension<EnvelopeStyle>,
    mut req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    // 非 POST 请求由上传处理器直接拒绝，不会读取请求体。
    if *req.method() != Method::POST {
        return next.run(req).await;
    }

    let verified = {
        let token = req
            .headers()
            .get(auth.token_header.as_str())
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        verify_token(&auth, token)
    };

    match verified {
        Ok(claims) => {
            debug!(username = claims.sub, "accesstoken accepted");
            req.extensions_mut().insert(AuthSubject(claims.sub));
            next.run(req).await
        }
        Err(err) => {
            warn!(error = %err, "accesstoken rejected");
            let result = drain_form_file(req, &upload.form_field)
                .await
                .and_then(|_| Err(ApiError::TokenInvalidOrExpired));
            style.wrap(result).into_response()
        }
    }
}

/// 读完并丢弃整个 multipart 请求体，要求其中包含指定的文件字段。
/// 返回丢弃的文件字段字节数。
pub async fn drain_form_file(req: Request<AxumBody>, field_name: &str) -> Result<u64, ApiError> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|err| ApiError::MissingOrMalformedFormFile(err.body_text()))?;

    let mut found = false;
    let mut drained: u64 = 0;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::MissingOrMalformedFormFile(err.body_text()))?
    {
        let is_file = field.name() == Some(field_name) && field.file_name().is_some();
        found |= is_file;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| ApiError::MissingOrMalformedFormFile(err.body_text()))?
        {
            if is_file {
                drained += chunk.len() as u64;
            }
        }
    }

    if !found {
        return Err(ApiError::MissingOrMalformedFormFile(format!(
            "field {field_name} not found"
        )));
    }
    debug!(bytes = drained, "drained rejected upload");
    Ok(drained)
}
