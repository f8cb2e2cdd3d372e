//! 表单文件上传：按日期分桶保存并返回访问地址。

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::rejection::ExtensionRejection;
use axum::extract::{Extension, Multipart};
use axum::http::{HeaderMap, Method};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::atomic::AtomicFile;
use crate::auth::AuthSubject;
use crate::envelope::{Envelope, EnvelopeStyle};
use crate::error::ApiError;
use crate::storage::{Storage, today};

/// URL 路径段中需要转义的字符。
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug)]
pub struct UploadConfig {
    pub form_field: String,
    pub subdir_header: String,
    pub static_prefix: String,
    pub max_body_size: u64,
}

/// 成功写入磁盘的上传文件。
#[derive(Debug)]
pub struct StoredFile {
    pub path: PathBuf,
    pub filename: String,
    pub url: String,
}

/// 上传接口：非 POST 请求直接拒绝，不读取请求体。
pub async fn upload_file(
    method: Method,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    Extension(style): Extension<EnvelopeStyle>,
    subject: Result<Extension<AuthSubject>, ExtensionRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Envelope {
    if let Ok(Extension(AuthSubject(username))) = &subject {
        debug!(username, "upload by authenticated user");
    }
    let result = store_upload(&method, &headers, &storage, &upload, multipart).await;
    style.wrap(result.map(|stored| Value::String(stored.url)))
}

async fn store_upload(
    method: &Method,
    headers: &HeaderMap,
    storage: &Storage,
    upload: &UploadConfig,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StoredFile, ApiError> {
    if *method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }
    let mut multipart =
        multipart.map_err(|err| ApiError::MissingOrMalformedFormFile(err.body_text()))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::MissingOrMalformedFormFile(err.body_text()))?
    {
        if field.name() != Some(upload.form_field.as_str()) {
            continue;
        }
        let raw_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(ApiError::MissingOrMalformedFormFile(format!(
                    "field {} is not a file",
                    upload.form_field
                )));
            }
        };
        let filename = decode_filename(&raw_name)?;

        let subdir = subdir_hint(headers, &upload.subdir_header)?;
        let resolved = storage.resolve_dated(subdir, today()).await?;
        let target = resolved.dir.join(&filename);

        let mut atomic = AtomicFile::new(&target)
            .await
            .map_err(|err| ApiError::FileCreateFailed(err.to_string()))?;
        let size = match copy_field(&mut field, atomic.file_mut()).await {
            Ok(size) => size,
            Err(err) => {
                atomic.cleanup().await;
                return Err(err);
            }
        };
        atomic
            .finalize()
            .await
            .map_err(|err| ApiError::CopyFailed(err.to_string()))?;

        let stored = StoredFile {
            url: public_url(&upload.static_prefix, &resolved.url_prefix, &filename),
            path: target,
            filename,
        };
        info!(
            path = ?stored.path,
            filename = stored.filename,
            size,
            url = stored.url,
            "upload stored"
        );
        return Ok(stored);
    }

    Err(ApiError::MissingOrMalformedFormFile(format!(
        "field {} not found",
        upload.form_field
    )))
}

async fn copy_field(field: &mut Field<'_>, file: &mut File) -> Result<u64, ApiError> {
    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| ApiError::CopyFailed(err.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|err| ApiError::CopyFailed(err.to_string()))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| ApiError::CopyFailed(err.to_string()))?;
    debug!(bytes = written, "form file copied");
    Ok(written)
}

/// 读取子目录请求头。头值按 UTF-8 解释，非法字节视为非法路径。
fn subdir_hint<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let subdir = std::str::from_utf8(value.as_bytes()).map_err(|_| ApiError::InvalidPath)?;
    Ok(Some(subdir).filter(|subdir| !subdir.trim().is_empty()))
}

/// 还原客户端转义过的文件名（如中文名），结果必须是单个路径段。
pub fn decode_filename(raw: &str) -> Result<String, ApiError> {
    let unescaped = raw.replace('+', " ");
    let decoded = match percent_decode_str(&unescaped).decode_utf8() {
        Ok(name) => name.into_owned(),
        Err(_) => raw.to_string(),
    };

    let mut components = Path::new(&decoded).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !decoded.contains(['/', '\\', '\0']) => {
            Ok(decoded)
        }
        _ => Err(ApiError::InvalidFilename(raw.to_string())),
    }
}

/// 拼接对外访问地址：`<prefix>/<subdir>/<date>/<filename>`。
pub fn public_url(static_prefix: &str, url_prefix: &str, filename: &str) -> String {
    let mut url = static_prefix.trim_end_matches('/').to_string();
    for segment in url_prefix.split('/').chain(std::iter::once(filename)) {
        if segment.is_empty() {
            continue;
        }
        url.push('/');
        url.extend(utf8_percent_encode(segment, PATH_SEGMENT));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn decode_filename_recovers_escaped_names() {
        assert_eq!(decode_filename("index.html").unwrap(), "index.html");
        assert_eq!(
            decode_filename("%E6%8A%A5%E5%91%8A.pdf").unwrap(),
            "\u{62a5}\u{544a}.pdf"
        );
        assert_eq!(decode_filename("my+notes.txt").unwrap(), "my notes.txt");
    }

    #[test]
    fn decode_filename_falls_back_to_raw_on_invalid_utf8() {
        assert_eq!(decode_filename("bad%FFname.bin").unwrap(), "bad%FFname.bin");
    }

    #[test]
    fn decode_filename_rejects_path_like_names() {
        for raw in [
            "../secret",
            "..%2Fsecret",
            "a/b.txt",
            "a%5Cb.txt",
            "..",
            ".",
            "a%00b.txt",
        ] {
            assert!(
                matches!(decode_filename(raw), Err(ApiError::InvalidFilename(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn subdir_header_is_read_as_utf8() {
        let mut headers = HeaderMap::new();
        assert_eq!(subdir_hint(&headers, "subdir").unwrap(), None);

        headers.insert("subdir", HeaderValue::from_static("  "));
        assert_eq!(subdir_hint(&headers, "subdir").unwrap(), None);

        headers.insert(
            "subdir",
            HeaderValue::from_bytes("\u{62a5}\u{544a}".as_bytes()).unwrap(),
        );
        assert_eq!(
            subdir_hint(&headers, "subdir").unwrap(),
            Some("\u{62a5}\u{544a}")
        );

        headers.insert("subdir", HeaderValue::from_bytes(b"bad\xff").unwrap());
        assert!(matches!(
            subdir_hint(&headers, "subdir"),
            Err(ApiError::InvalidPath)
        ));
    }

    #[test]
    fn public_url_matches_storage_layout() {
        assert_eq!(
            public_url("/static", "2024-01-02", "index.html"),
            "/static/2024-01-02/index.html"
        );
        assert_eq!(
            public_url("/static/", "avatars/2024-01-02", "my notes.txt"),
            "/static/avatars/2024-01-02/my%20notes.txt"
        );
        assert_eq!(
            public_url("/static", "2024-01-02", "\u{62a5}.pdf"),
            "/static/2024-01-02/%E6%8A%A5.pdf"
        );
    }
}
