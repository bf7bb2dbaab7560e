//! 文件引擎：基于路径守卫的列表、读写、建目录、删除、重命名与下载。
//!
//! 所有操作均为同步阻塞 I/O，调用方需在阻塞线程池中执行。
//! 不同连接对同一路径的并发重命名/删除在文件系统层面竞争，这里不做额外加锁。

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::warn;

use crate::path_guard::{FileKind, PathGuard, classify, icon_for};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path is outside the root directory")]
    PathEscape,
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    #[error("the root directory cannot be deleted or renamed")]
    RootProtected,
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("file too large for download (max {limit_mb}MB)")]
    TooLarge { limit_mb: u64 },
    #[error("invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub is_folder: bool,
    pub last_modified: u64,
    pub size: u64,
    pub icon: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Base64,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileContent {
    pub path: String,
    pub name: String,
    pub content: String,
    pub encoding: Encoding,
    pub size: u64,
    pub is_binary: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DownloadPayload {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub content: String,
}

#[derive(Debug)]
pub struct Storage {
    guard: PathGuard,
    max_download_mb: u64,
}

impl Storage {
    pub fn new(root: PathBuf, max_download_mb: u64) -> Self {
        Self {
            guard: PathGuard::new(root),
            max_download_mb,
        }
    }

    /// 整文件传输（下载、日志读取）的大小上限。
    pub fn check_transfer_size(&self, size: u64) -> Result<(), StorageError> {
        if size > self.max_download_mb.saturating_mul(BYTES_PER_MB) {
            return Err(StorageError::TooLarge {
                limit_mb: self.max_download_mb,
            });
        }
        Ok(())
    }

    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(self.guard.root_path())
    }

    #[cfg(test)]
    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    fn contained(&self, requested: &str) -> Result<PathBuf, StorageError> {
        self.guard.contain(requested).ok_or(StorageError::PathEscape)
    }

    /// 列出目录的直接子项；空路径表示根目录。目录不可读时返回空列表。
    pub fn list(&self, requested: Option<&str>) -> Result<(PathBuf, Vec<FileInfo>), StorageError> {
        let requested = requested.unwrap_or("");
        let target = self.contained(requested)?;
        if !self.guard.is_existing_folder(requested) {
            return Err(StorageError::FolderNotFound(display(&target)));
        }

        let mut files = Vec::new();
        let Ok(entries) = fs::read_dir(&target) else {
            return Ok((target, files));
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(name, error = %err, "skip entry without metadata");
                    continue;
                }
            };
            let is_folder = metadata.is_dir();
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(|duration| duration.as_millis() as u64)
                .unwrap_or_default();
            files.push(FileInfo {
                icon: icon_for(&name, is_folder),
                size: if is_folder { 0 } else { metadata.len() },
                name,
                is_folder,
                last_modified,
            });
        }

        Ok((target, files))
    }

    /// 读取文件：文本按 UTF-8 解码，二进制转为 base64。
    pub fn read(&self, requested: &str) -> Result<FileContent, StorageError> {
        let target = self.contained(requested)?;
        if !self.guard.is_existing_file(requested) {
            return Err(StorageError::FileNotFound(requested.to_string()));
        }

        let name = file_name(&target);
        let bytes = fs::read(&target)?;
        let size = bytes.len() as u64;
        let (content, encoding, is_binary) = match classify(&name) {
            FileKind::Text => (String::from_utf8(bytes)?, Encoding::Utf8, false),
            FileKind::Binary => (BASE64.encode(bytes), Encoding::Base64, true),
        };

        Ok(FileContent {
            path: display(&target),
            name,
            content,
            encoding,
            size,
            is_binary,
        })
    }

    /// 写入文件（不存在则创建），返回目标路径以及是否为新建。
    ///
    /// 写入非原子，失败时可能留下部分内容。
    pub fn write(&self, requested: &str, content: &str) -> Result<(PathBuf, bool), StorageError> {
        let target = self.contained(requested)?;
        let bytes = match classify(&file_name(&target)) {
            FileKind::Text => content.as_bytes().to_vec(),
            FileKind::Binary => BASE64.decode(content.trim())?,
        };
        let created = !target.exists();
        fs::write(&target, bytes)?;
        Ok((target, created))
    }

    /// 创建目录（含父级），目标已存在时失败。
    pub fn create_folder(&self, requested: &str) -> Result<PathBuf, StorageError> {
        let target = self.contained(requested)?;
        if target.exists() {
            return Err(StorageError::AlreadyExists(display(&target)));
        }
        fs::create_dir_all(&target)?;
        Ok(target)
    }

    /// 删除文件或递归删除目录；根目录永远不可删除。
    pub fn delete(&self, requested: &str) -> Result<PathBuf, StorageError> {
        let target = self.contained(requested)?;
        if !target.exists() {
            return Err(StorageError::FileNotFound(requested.to_string()));
        }
        if self.guard.is_root(requested) {
            return Err(StorageError::RootProtected);
        }

        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(target)
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<PathBuf, StorageError> {
        let source = self.contained(old_path)?;
        if !source.exists() {
            return Err(StorageError::FileNotFound(old_path.to_string()));
        }
        if self.guard.is_root(old_path) || self.guard.is_root(new_path) {
            return Err(StorageError::RootProtected);
        }
        let destination = self.contained(new_path)?;

        fs::rename(&source, &destination)?;
        Ok(destination)
    }

    /// 读取整个文件用于下载；超过上限时仅凭元数据拒绝，不读取内容。
    pub fn download(&self, requested: &str) -> Result<DownloadPayload, StorageError> {
        let target = self.contained(requested)?;
        if !self.guard.is_existing_file(requested) {
            return Err(StorageError::FileNotFound(requested.to_string()));
        }

        let size = fs::metadata(&target)?.len();
        self.check_transfer_size(size)?;

        let bytes = fs::read(&target)?;
        Ok(DownloadPayload {
            filename: file_name(&target),
            path: display(&target),
            size,
            content: BASE64.encode(bytes),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
