use chrono::{Local, NaiveDate};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

/// A dated upload directory and the URL prefix it is served under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDir {
    pub dir: PathBuf,
    pub url_prefix: String,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Creates `<root>/<subdir>/<date>` if missing. Safe to call repeatedly.
    pub async fn resolve_dated(
        &self,
        subdir: Option<&str>,
        date: NaiveDate,
    ) -> Result<ResolvedDir, StorageError> {
        let relative = normalize_subdir(subdir)?;
        let day = date.format(DATE_FORMAT).to_string();
        let dir = self.root.join(&relative).join(&day);
        fs::create_dir_all(&dir).await?;

        let mut segments: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        segments.push(day);

        Ok(ResolvedDir {
            dir,
            url_prefix: segments.join("/"),
        })
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn normalize_subdir(subdir: Option<&str>) -> Result<PathBuf, StorageError> {
    let mut normalized = PathBuf::new();

    if let Some(value) = subdir {
        let trimmed = value.trim().trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
    }

    Ok(normalized)
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{ResolvedDir, Storage, StorageError};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date")
    }

    #[tokio::test]
    async fn resolve_without_subdir_uses_date_bucket() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("assets"));

        let resolved = storage.resolve_dated(None, day()).await.expect("resolve");
        assert_eq!(
            resolved,
            ResolvedDir {
                dir: temp.path().join("assets").join("2024-01-02"),
                url_prefix: "2024-01-02".to_string(),
            }
        );
        assert!(resolved.dir.is_dir());
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());

        let first = storage
            .resolve_dated(Some("avatars"), day())
            .await
            .expect("first resolve");
        let second = storage
            .resolve_dated(Some("avatars"), day())
            .await
            .expect("second resolve");
        assert_eq!(first, second);
        assert_eq!(first.url_prefix, "avatars/2024-01-02");
    }

    #[tokio::test]
    async fn nested_subdir_is_normalized() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());

        let resolved = storage
            .resolve_dated(Some("/docs/./2024/"), day())
            .await
            .expect("resolve");
        assert_eq!(resolved.url_prefix, "docs/2024/2024-01-02");
        assert_eq!(resolved.dir, temp.path().join("docs/2024/2024-01-02"));

        let empty = storage.resolve_dated(Some(""), day()).await.expect("resolve");
        assert_eq!(empty.url_prefix, "2024-01-02");
    }

    #[tokio::test]
    async fn parent_components_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("assets"));

        let result = storage.resolve_dated(Some("../outside"), day()).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
        assert!(!temp.path().join("outside").exists());
    }

    #[tokio::test]
    async fn create_failure_surfaces_io_error() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("assets");
        std::fs::write(&root, b"not a directory").expect("write blocker");
        let storage = Storage::new(root);

        let result = storage.resolve_dated(None, day()).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
