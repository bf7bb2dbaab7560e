//! CLI 参数与服务默认配置。

use clap::Parser;
use shadow_rs::formatcp;

use crate::auth::{Account, Role};
use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const WS_PATH: &str = "/ws";
pub const DEFAULT_ACCOUNT: &str = "admin:admin:admin";
pub const DEFAULT_LOG_FILE: &str = "logs/latest.log";
pub const DEFAULT_DOWNLOAD_MAX_MB: u64 = 50;
pub const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 0;
pub const DEFAULT_LOGIN_WINDOW_SECS: u64 = 5 * 60;
pub const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 10 * 60;
pub const LOGIN_PRUNE_INTERVAL_SECS: u64 = 300;

/// 服务端 CLI 参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "axo-console", version = VERSION_INFO, about = "AxoConsole remote administration server")]
pub struct Args {
    #[arg(
        short = 'r',
        long,
        env = "AXO_ROOT_DIR",
        default_value = ".",
        help = "Root directory all file operations are confined to"
    )]
    pub root_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "AXO_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "AXO_PORT",
        default_value_t = 8080,
        help = "Listening port for the console socket and web UI"
    )]
    pub port: u16,
    #[arg(long, env = "AXO_TLS", help = "Serve over TLS (self-signed unless cert/key given)")]
    pub tls: bool,
    #[arg(short = 'c', long, env = "AXO_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "AXO_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(
        short = 'a',
        long = "account",
        env = "AXO_ACCOUNTS",
        value_delimiter = ',',
        help = "Account as ROLE:USERNAME:PASSWORD (repeatable, ROLE is admin or user)"
    )]
    pub accounts: Vec<Account>,
    #[arg(
        long,
        env = "AXO_LOG_VIEWER_ROLE",
        value_enum,
        default_value_t = Role::User,
        help = "Minimum role allowed to run READLOGFILE"
    )]
    pub log_viewer_role: Role,
    #[arg(
        long,
        env = "AXO_DOWNLOAD_MAX_MB",
        default_value_t = DEFAULT_DOWNLOAD_MAX_MB,
        help = "Max file size for FILE_DOWNLOAD in MB"
    )]
    pub download_max_mb: u64,
    #[arg(
        long,
        env = "AXO_SERVER_CMD",
        help = "Managed server command line; its output feeds the console stream"
    )]
    pub server_cmd: Option<String>,
    #[arg(
        long,
        env = "AXO_LOG_FILE",
        help = "Log file served by READLOGFILE (default: <root>/logs/latest.log)"
    )]
    pub log_file: Option<String>,
    #[arg(long, env = "AXO_PHRASES", help = "JSON file overriding message phrases")]
    pub phrases_file: Option<String>,
    #[arg(
        long,
        env = "AXO_LOGIN_MAX_ATTEMPTS",
        default_value_t = DEFAULT_LOGIN_MAX_ATTEMPTS,
        help = "Max failed logins per IP before lockout (0 to disable)"
    )]
    pub login_max_attempts: u32,
    #[arg(
        long,
        env = "AXO_LOGIN_WINDOW_SECS",
        default_value_t = DEFAULT_LOGIN_WINDOW_SECS,
        help = "Login attempt window in seconds"
    )]
    pub login_window_secs: u64,
    #[arg(
        long,
        env = "AXO_LOGIN_LOCKOUT_SECS",
        default_value_t = DEFAULT_LOGIN_LOCKOUT_SECS,
        help = "Login lockout time after max attempts"
    )]
    pub login_lockout_secs: u64,
}
