//! 临时写入与原子替换：上传中途失败时不留下残缺文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

const TEMP_NAME_PREFIX_CHARS: usize = 64;

/// 目标文件同目录下的临时文件。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent")
        })?;
        // 临时名只取目标名前缀，加上后缀后不能超出文件名长度上限。
        let base: String = target
            .file_name()
            .map(|name| {
                name.to_string_lossy()
                    .chars()
                    .take(TEMP_NAME_PREFIX_CHARS)
                    .collect()
            })
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}.tmp.{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 落盘后覆盖目标文件（同名文件直接替换）。
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            drop(self.file);
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    return fs::rename(&self.temp_path, &self.target).await;
                }
            }
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicFile;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn finalize_replaces_existing_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("report.txt");
        std::fs::write(&target, b"old").expect("seed target");

        let mut atomic = AtomicFile::new(&target).await.expect("create temp");
        atomic.file_mut().write_all(b"new").await.expect("write");
        atomic.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&target).expect("read"), b"new");
        let leftovers = std::fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn long_target_name_still_finalizes() {
        let temp = tempdir().expect("tempdir");
        let name = format!("{}.txt", "a".repeat(240));
        let target = temp.path().join(&name);

        let mut atomic = AtomicFile::new(&target).await.expect("create temp");
        atomic.file_mut().write_all(b"long").await.expect("write");
        atomic.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&target).expect("read"), b"long");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }

    #[tokio::test]
    async fn cleanup_leaves_no_partial_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("partial.bin");

        let mut atomic = AtomicFile::new(&target).await.expect("create temp");
        atomic.file_mut().write_all(b"half").await.expect("write");
        atomic.cleanup().await;

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }
}
