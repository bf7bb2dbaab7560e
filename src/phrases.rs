//! 提示语查找：内置英文文案，可由 JSON 文件覆盖。

use std::collections::HashMap;
use std::io;
use std::path::Path;

const ENGLISH: &[(&str, &str)] = &[
    ("login-required", "Login required"),
    ("logged-in", "Logged in"),
    ("logged-out", "Logged out"),
    ("login-failed", "Incorrect credentials"),
    ("login-throttled", "Too many login attempts"),
    ("unknown-command", "Unknown command"),
    ("no-send-permission", "You don't have permission to do that"),
    ("missing-parameters", "Missing parameters"),
    ("invalid-parameters", "Invalid parameters"),
    ("access-denied", "Access denied"),
    ("file-not-found", "File not found"),
    ("folder-not-found", "Folder not found"),
    ("cannot-delete-root", "The root folder cannot be deleted or renamed"),
    ("folder-already-exists", "Folder already exists"),
    ("file-list", "File list retrieved successfully"),
    ("file-read", "File content retrieved successfully"),
    ("file-created", "File created successfully"),
    ("file-updated", "File updated successfully"),
    ("file-download", "File download ready"),
    ("file-deleted", "File deleted"),
    ("file-renamed", "File renamed"),
    ("folder-created", "Folder created"),
    ("console-unavailable", "No server console is attached"),
    ("log-file-not-found", "Log file not found"),
    ("players", "Connected players"),
    ("cpu-usage", "CPU usage"),
    ("ram-usage", "RAM usage"),
    ("tps", "Ticks per second"),
];

#[derive(Debug, Clone)]
pub struct Phrases {
    table: HashMap<String, String>,
}

impl Phrases {
    pub fn english() -> Self {
        Self {
            table: ENGLISH
                .iter()
                .map(|(id, text)| (id.to_string(), text.to_string()))
                .collect(),
        }
    }

    /// 以英文为底，按 `{"phrase-id": "text"}` 覆盖。
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let mut phrases = Self::english();
        phrases.table.extend(overrides);
        Ok(phrases)
    }

    /// 未知 id 原样返回。
    pub fn phrase(&self, id: &str) -> String {
        self.table
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}
