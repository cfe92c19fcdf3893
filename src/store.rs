//! 图片元数据存储：单个 JSON 文件保存全部记录，上传目录保存图片本体。

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::atomic::write_atomic;

/// 上传文件对外访问的 URL 前缀。
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// 上传暂存目录名，位于元数据文件所在目录下。
pub const STAGING_DIR: &str = ".staging";

/// 元数据文件中的一条图片记录。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub filename: String,
    pub original_name: String,
    #[serde(default)]
    pub link_url: String,
    pub timestamp: i64,
}

impl ImageRecord {
    /// 对外访问路径 `/uploads/<filename>`。
    pub fn public_url(&self) -> String {
        format!("{UPLOADS_URL_PREFIX}/{}", self.filename)
    }
}

#[derive(Debug)]
pub struct ImageStore {
    store_path: PathBuf,
    uploads_dir: PathBuf,
    staging_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ImageStore {
    pub fn new(store_path: PathBuf, uploads_dir: PathBuf) -> Self {
        let staging_dir = match store_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(STAGING_DIR),
            _ => PathBuf::from(STAGING_DIR),
        };
        Self {
            store_path,
            uploads_dir,
            staging_dir,
            write_lock: Mutex::new(()),
        }
    }

    /// 确保上传目录、暂存目录与元数据文件所在目录存在。
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads_dir).await?;
        fs::create_dir_all(&self.staging_dir).await?;
        Ok(())
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// 上传过程中的临时文件放在这里，不会被静态服务暴露，也不受清空上传目录影响。
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// 串行化“读取-修改-写回”，持有期间其他写者等待。
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// 读取全部记录；文件缺失、无法读取或内容不是记录数组时返回空列表。
    pub async fn read_all(&self) -> Vec<ImageRecord> {
        let bytes = match fs::read(&self.store_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = ?self.store_path, error = %err, "failed to read image store");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<ImageRecord>>(&bytes) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = ?self.store_path, error = %err, "image store is not a record list");
                Vec::new()
            }
        }
    }

    /// 以缩进格式整体覆盖写入全部记录。
    pub async fn write_all(&self, records: &[ImageRecord]) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.store_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.store_path, &content).await?;
        Ok(())
    }

    /// 将文件名映射到上传目录，只接受单一普通路径段。
    pub fn upload_path(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) => Ok(self.uploads_dir.join(segment)),
            _ => Err(StoreError::InvalidName),
        }
    }

    /// 尽力删除单个上传文件，失败时忽略。
    pub async fn remove_upload(&self, filename: &str) {
        let path = match self.upload_path(filename) {
            Ok(path) => path,
            Err(_) => {
                debug!(filename, "skip unlink of invalid upload name");
                return;
            }
        };
        if let Err(err) = fs::remove_file(&path).await {
            debug!(path = ?path, error = %err, "upload unlink failed");
        }
    }

    /// 尽力删除上传目录中的每个条目，返回成功删除的数量。
    pub async fn clear_uploads(&self) -> usize {
        let mut dir = match fs::read_dir(&self.uploads_dir).await {
            Ok(dir) => dir,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = ?self.uploads_dir, error = %err, "failed to list uploads");
                }
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    match fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(err) => debug!(path = ?path, error = %err, "upload unlink failed"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(path = ?self.uploads_dir, error = %err, "failed to list uploads");
                    break;
                }
            }
        }
        removed
    }
}

#[derive(Debug)]
pub enum StoreError {
    InvalidName,
    Io(io::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}
