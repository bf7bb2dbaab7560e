//! 路径守卫：根目录约束、存在性检查与文本/二进制分类。
//!
//! 每次调用都重新规范化请求路径与根目录，不缓存任何解析结果。

use std::io;
use std::path::{Component, Path, PathBuf};

/// 按扩展名判定为文本的文件类型，其余一律按二进制处理。
const TEXT_EXTENSIONS: &[&str] = &[
    "txt",
    "log",
    "yml",
    "yaml",
    "json",
    "xml",
    "html",
    "htm",
    "css",
    "js",
    "ts",
    "sh",
    "bat",
    "cmd",
    "py",
    "java",
    "c",
    "cpp",
    "h",
    "hpp",
    "cs",
    "go",
    "rb",
    "php",
    "pl",
    "sql",
    "ini",
    "cfg",
    "conf",
    "properties",
    "md",
    "csv",
    "toml",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
}

#[derive(Clone, Debug)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn canonical_root(&self) -> io::Result<PathBuf> {
        std::fs::canonicalize(&self.root)
    }

    /// 相对路径以根目录为基准，绝对路径原样使用。
    pub fn absolute(&self, requested: &str) -> PathBuf {
        let path = Path::new(requested);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// 返回位于根目录内（含根目录本身）的规范路径，越界或无法解析时返回 `None`。
    pub fn contain(&self, requested: &str) -> Option<PathBuf> {
        let root = self.canonical_root().ok()?;
        let resolved = canonicalize_lenient(&self.absolute(requested)).ok()?;
        resolved.starts_with(&root).then_some(resolved)
    }

    pub fn is_existing_file(&self, requested: &str) -> bool {
        self.contain(requested).is_some_and(|path| path.is_file())
    }

    pub fn is_existing_folder(&self, requested: &str) -> bool {
        self.contain(requested).is_some_and(|path| path.is_dir())
    }

    pub fn is_root(&self, requested: &str) -> bool {
        match (
            self.canonical_root(),
            canonicalize_lenient(&self.absolute(requested)),
        ) {
            (Ok(root), Ok(resolved)) => root == resolved,
            _ => false,
        }
    }
}

/// 解析悬空符号链接时允许的最大跳转次数。
const MAX_SYMLINK_HOPS: usize = 40;

/// 规范化路径；不存在的尾部组件按字面拼接到最长的已存在祖先之后。
///
/// 悬空符号链接不会被当作普通名字保留，而是按链接目标继续解析。
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    resolve_lenient(path, MAX_SYMLINK_HOPS)
}

fn resolve_lenient(path: &Path, hops: usize) -> io::Result<PathBuf> {
    let path: PathBuf = path.components().collect();
    let mut existing = path.as_path();
    let mut tail = Vec::new();

    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for component in tail.iter().rev() {
                    match component {
                        Component::Normal(segment) => resolved.push(segment),
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        _ => {}
                    }
                }
                return Ok(resolved);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                let is_symlink = std::fs::symlink_metadata(existing)
                    .is_ok_and(|metadata| metadata.file_type().is_symlink());
                if is_symlink {
                    if hops == 0 {
                        return Err(io::Error::other("too many levels of symbolic links"));
                    }
                    let target = std::fs::read_link(existing)?;
                    let mut redirected = existing
                        .parent()
                        .map(|parent| parent.join(&target))
                        .unwrap_or(target);
                    for component in tail.iter().rev() {
                        redirected.push(component.as_os_str());
                    }
                    return resolve_lenient(&redirected, hops - 1);
                }

                let (Some(component), Some(parent)) =
                    (existing.components().next_back(), existing.parent())
                else {
                    return Err(err);
                };
                tail.push(component);
                existing = parent;
            }
            Err(err) => return Err(err),
        }
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// 根据扩展名判断文件按文本还是二进制传输。
pub fn classify(filename: &str) -> FileKind {
    let ext = extension_of(filename);
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Text
    } else {
        FileKind::Binary
    }
}

/// 列表展示用的图标标签。
pub fn icon_for(filename: &str, is_folder: bool) -> &'static str {
    if is_folder {
        return "folder";
    }
    match extension_of(filename).as_str() {
        "yml" | "yaml" => "file-code",
        "json" => "file-json",
        "txt" | "log" => "file-text",
        "png" | "jpg" | "jpeg" | "gif" | "ico" => "file-image",
        "mp3" | "wav" | "ogg" | "m4a" => "file-audio",
        "mp4" | "avi" | "mkv" | "mov" => "file-video",
        "zip" | "jar" | "rar" | "7z" | "tar" | "gz" => "file-archive",
        "sql" => "file-database",
        "html" | "htm" | "css" | "js" | "ts" => "file-code",
        "sh" => "file-terminal",
        "xml" => "file-xml",
        _ => "file",
    }
}
