//! 响应信封：每种响应都是固定结构，客户端按 `status` 分派。

use chrono::Local;
use serde::Serialize;

use crate::auth::Role;
use crate::host::{PlayerList, RamUsage};
use crate::storage::{DownloadPayload, FileContent, FileInfo};

pub const STATUS_CONSOLE_OUTPUT: u16 = 10;
pub const STATUS_OK: u16 = 200;
pub const STATUS_PLAYERS: u16 = 1000;
pub const STATUS_CPU_USAGE: u16 = 1001;
pub const STATUS_RAM_USAGE: u16 = 1002;
pub const STATUS_TPS: u16 = 1003;
pub const STATUS_FILE_LIST: u16 = 2000;
pub const STATUS_FILE_READ: u16 = 2001;
pub const STATUS_FILE_WRITE: u16 = 2002;
pub const STATUS_FILE_DOWNLOAD: u16 = 2003;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
pub const STATUS_INTERNAL: u16 = 500;

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PathBody {
    pub status: u16,
    pub message: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ConsoleOutputBody {
    pub status: u16,
    pub message: String,
    pub time: String,
}

#[derive(Debug, Serialize)]
pub struct LoggedInBody {
    pub status: u16,
    pub message: String,
    pub username: String,
    #[serde(rename = "as")]
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersBody {
    pub status: u16,
    pub message: String,
    pub connected_players: usize,
    pub max_players: u32,
    pub players: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CpuUsageBody {
    pub status: u16,
    pub message: String,
    pub usage: f64,
}

#[derive(Debug, Serialize)]
pub struct RamUsageBody {
    pub status: u16,
    pub message: String,
    pub free: u64,
    pub used: u64,
    pub max: u64,
}

#[derive(Debug, Serialize)]
pub struct TpsBody {
    pub status: u16,
    pub message: String,
    pub tps: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListBody {
    pub status: u16,
    pub message: String,
    pub files: Vec<FileInfo>,
    pub current_path: String,
}

#[derive(Debug, Serialize)]
pub struct FileReadBody {
    pub status: u16,
    pub message: String,
    #[serde(flatten)]
    pub file: FileContent,
}

#[derive(Debug, Serialize)]
pub struct FileDownloadBody {
    pub status: u16,
    pub message: String,
    #[serde(flatten)]
    pub download: DownloadPayload,
}

/// 所有可发送给客户端的响应。
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Message(MessageBody),
    Path(PathBody),
    ConsoleOutput(ConsoleOutputBody),
    LoggedIn(LoggedInBody),
    Players(PlayersBody),
    CpuUsage(CpuUsageBody),
    RamUsage(RamUsageBody),
    Tps(TpsBody),
    FileList(FileListBody),
    FileRead(FileReadBody),
    FileDownload(FileDownloadBody),
}

impl Envelope {
    pub fn message(status: u16, message: String) -> Self {
        Self::Message(MessageBody { status, message })
    }

    /// 文件写入用 2002，其余文件操作用 200。
    pub fn path(status: u16, message: String, path: String) -> Self {
        Self::Path(PathBody {
            status,
            message,
            path,
        })
    }

    pub fn console_output(line: String) -> Self {
        Self::ConsoleOutput(ConsoleOutputBody {
            status: STATUS_CONSOLE_OUTPUT,
            message: line,
            time: Local::now().format("%H:%M:%S").to_string(),
        })
    }

    pub fn logged_in(message: String, username: String, role: Role) -> Self {
        Self::LoggedIn(LoggedInBody {
            status: STATUS_OK,
            message,
            username,
            role,
        })
    }

    pub fn players(message: String, list: PlayerList) -> Self {
        Self::Players(PlayersBody {
            status: STATUS_PLAYERS,
            message,
            connected_players: list.players.len(),
            max_players: list.max,
            players: list.players,
        })
    }

    pub fn cpu_usage(message: String, usage: f64) -> Self {
        Self::CpuUsage(CpuUsageBody {
            status: STATUS_CPU_USAGE,
            message,
            usage,
        })
    }

    pub fn ram_usage(message: String, ram: RamUsage) -> Self {
        Self::RamUsage(RamUsageBody {
            status: STATUS_RAM_USAGE,
            message,
            free: ram.free,
            used: ram.used,
            max: ram.max,
        })
    }

    pub fn tps(message: String, tps: Option<f64>) -> Self {
        Self::Tps(TpsBody {
            status: STATUS_TPS,
            message,
            tps,
        })
    }

    pub fn file_list(message: String, files: Vec<FileInfo>, current_path: String) -> Self {
        Self::FileList(FileListBody {
            status: STATUS_FILE_LIST,
            message,
            files,
            current_path,
        })
    }

    pub fn file_read(message: String, file: FileContent) -> Self {
        Self::FileRead(FileReadBody {
            status: STATUS_FILE_READ,
            message,
            file,
        })
    }

    pub fn file_download(message: String, download: DownloadPayload) -> Self {
        Self::FileDownload(FileDownloadBody {
            status: STATUS_FILE_DOWNLOAD,
            message,
            download,
        })
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Message(body) => body.status,
            Self::Path(body) => body.status,
            Self::ConsoleOutput(body) => body.status,
            Self::LoggedIn(body) => body.status,
            Self::Players(body) => body.status,
            Self::CpuUsage(body) => body.status,
            Self::RamUsage(body) => body.status,
            Self::Tps(body) => body.status,
            Self::FileList(body) => body.status,
            Self::FileRead(body) => body.status,
            Self::FileDownload(body) => body.status,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            String::from(r#"{"status":500,"message":"response serialization failed"}"#)
        })
    }
}
