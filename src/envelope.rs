//! 统一 JSON 响应结构 `{code|state, data, msg}`。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clap::ValueEnum;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;

pub const SUCCESS_MSG: &str = "SUCCESS";

/// 状态码字段名：`code`（带认证的接口）或 `state`（旧版接口）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EnvelopeStyle {
    #[default]
    Code,
    State,
}

impl EnvelopeStyle {
    pub fn field_name(self) -> &'static str {
        match self {
            EnvelopeStyle::Code => "code",
            EnvelopeStyle::State => "state",
        }
    }

    pub fn success(self, data: Value) -> Envelope {
        Envelope {
            style: self,
            code: StatusCode::OK,
            data: Some(data),
            msg: SUCCESS_MSG,
        }
    }

    pub fn failure(self, error: &ApiError) -> Envelope {
        Envelope {
            style: self,
            code: error.status(),
            data: None,
            msg: error.message(),
        }
    }

    /// 将处理结果转换为响应体，失败时记录原因。
    pub fn wrap(self, result: Result<Value, ApiError>) -> Envelope {
        match result {
            Ok(data) => self.success(data),
            Err(err) => {
                warn!(code = err.status().as_u16(), error = %err, "request failed");
                self.failure(&err)
            }
        }
    }
}

/// 每个请求只写出一次的 JSON 结果。
#[derive(Debug)]
pub struct Envelope {
    style: EnvelopeStyle,
    code: StatusCode,
    data: Option<Value>,
    msg: &'static str,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(self.style.field_name(), &self.code.as_u16())?;
        if let Some(data) = &self.data {
            map.serialize_entry("data", data)?;
        }
        map.serialize_entry("msg", self.msg)?;
        map.end()
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_style_serializes_all_fields() {
        let envelope = EnvelopeStyle::Code.success(json!("/static/2024-01-02/index.html"));
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            value,
            json!({"code": 200, "data": "/static/2024-01-02/index.html", "msg": "SUCCESS"})
        );
    }

    #[test]
    fn state_style_omits_missing_data() {
        let envelope = EnvelopeStyle::State.failure(&ApiError::MethodNotAllowed);
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            value,
            json!({"state": 400, "msg": "request method not support"})
        );
    }

    #[test]
    fn response_status_follows_envelope_code() {
        let envelope = EnvelopeStyle::Code.wrap(Err(ApiError::TokenInvalidOrExpired));
        assert!(envelope.data.is_none());
        let response = envelope.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
    }
}
