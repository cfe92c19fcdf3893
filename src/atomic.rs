//! 临时写入与原子替换：元数据文件与上传文件共用。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 可用于原子替换的临时文件封装。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        Self::new_in(parent, target).await
    }

    /// 在指定暂存目录创建临时文件，完成后再移动到目标路径。
    pub async fn new_in(temp_dir: &Path, target: &Path) -> io::Result<Self> {
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}.tmp.{}", Uuid::new_v4());
        let temp_path = temp_dir.join(temp_name);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    /// 追加写入一段数据。
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并原子替换目标文件。
    pub async fn finalize(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        match fs::rename(&self.temp_path, &self.target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                // 暂存目录与目标不在同一文件系统时退化为复制。
                let copied = fs::copy(&self.temp_path, &self.target).await;
                let _ = fs::remove_file(&self.temp_path).await;
                if copied.is_err() {
                    let _ = fs::remove_file(&self.target).await;
                }
                copied.map(|_| ())
            }
            Err(err) => {
                #[cfg(windows)]
                {
                    if fs::remove_file(&self.target).await.is_ok() {
                        return fs::rename(&self.temp_path, &self.target).await;
                    }
                }
                let _ = fs::remove_file(&self.temp_path).await;
                Err(err)
            }
        }
    }
}

/// 一次性写入整个文件内容并原子替换。
pub async fn write_atomic(target: &Path, contents: &[u8]) -> io::Result<()> {
    let mut atomic = AtomicFile::new(target).await?;
    if let Err(err) = atomic.write_all(contents).await {
        atomic.cleanup().await;
        return Err(err);
    }
    atomic.finalize().await
}
