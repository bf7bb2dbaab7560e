//! 宿主进程接口：状态指标、控制台执行与日志流。
//!
//! `ProcessHost` 可托管一个子进程：其 stdout/stderr 作为日志流，EXEC 写入其 stdin。

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use sysinfo::System;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const LOG_CHANNEL_CAPACITY: usize = 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct PlayerList {
    pub players: Vec<String>,
    pub max: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RamUsage {
    pub free: u64,
    pub used: u64,
    pub max: u64,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no server console is attached")]
    Detached,
    #[error("server console input is closed")]
    Closed,
}

/// 被管理服务器向控制台暴露的能力。
pub trait ServerHost: Send + Sync {
    fn players(&self) -> PlayerList;
    fn cpu_usage(&self) -> f64;
    /// 单位 MB。
    fn ram_usage(&self) -> RamUsage;
    /// 宿主无法采样时返回 `None`。
    fn ticks_per_second(&self) -> Option<f64>;
    fn execute(&self, line: &str) -> Result<(), HostError>;
    fn subscribe_logs(&self) -> broadcast::Receiver<String>;
    fn log_file(&self) -> Option<PathBuf>;
}

pub struct ProcessHost {
    stdin: Option<mpsc::UnboundedSender<String>>,
    logs: broadcast::Sender<String>,
    system: Mutex<System>,
    log_file: Option<PathBuf>,
}

impl ProcessHost {
    /// 不托管子进程：EXEC 不可用，日志流保持静默。
    pub fn detached(log_file: Option<PathBuf>) -> Self {
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        // CPU 占用按两次采样之差计算，先取一次基线
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            stdin: None,
            logs,
            system: Mutex::new(system),
            log_file,
        }
    }

    /// 在 `working_dir` 中启动命令行（按空白切分），需在 tokio 运行时内调用。
    pub fn spawn(
        command_line: &str,
        working_dir: &Path,
        log_file: Option<PathBuf>,
    ) -> io::Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "server command is empty")
        })?;
        let mut child = Command::new(program)
            .args(parts)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        info!(command = command_line, pid = ?child.id(), "managed server started");

        let mut host = Self::detached(log_file);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, host.logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, host.logs.clone());
        }
        if let Some(mut stdin) = child.stdin.take() {
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    let written = async {
                        stdin.write_all(line.as_bytes()).await?;
                        stdin.write_all(b"\n").await?;
                        stdin.flush().await
                    }
                    .await;
                    if let Err(err) = written {
                        warn!(error = %err, "write to server console failed");
                        break;
                    }
                }
            });
            host.stdin = Some(tx);
        }

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(%status, "managed server exited"),
                Err(err) => warn!(error = %err, "managed server wait failed"),
            }
        });

        Ok(host)
    }
}

fn forward_lines<R>(reader: R, logs: broadcast::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "console", "{line}");
                    let _ = logs.send(line);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "server output stream failed");
                    break;
                }
            }
        }
    });
}

impl ServerHost for ProcessHost {
    fn players(&self) -> PlayerList {
        PlayerList::default()
    }

    fn cpu_usage(&self) -> f64 {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_cpu_usage();
        f64::from(system.global_cpu_usage())
    }

    fn ram_usage(&self) -> RamUsage {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();
        RamUsage {
            free: system.available_memory() / BYTES_PER_MB,
            used: system.used_memory() / BYTES_PER_MB,
            max: system.total_memory() / BYTES_PER_MB,
        }
    }

    fn ticks_per_second(&self) -> Option<f64> {
        None
    }

    fn execute(&self, line: &str) -> Result<(), HostError> {
        let stdin = self.stdin.as_ref().ok_or(HostError::Detached)?;
        stdin
            .send(line.to_string())
            .map_err(|_| HostError::Closed)
    }

    fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.logs.subscribe()
    }

    fn log_file(&self) -> Option<PathBuf> {
        self.log_file.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 测试用宿主：记录执行过的命令，日志由测试手动推送。
    pub struct FakeHost {
        pub executed: Mutex<Vec<String>>,
        pub logs: broadcast::Sender<String>,
        pub log_file: Option<PathBuf>,
    }

    impl FakeHost {
        pub fn new(log_file: Option<PathBuf>) -> Self {
            let (logs, _) = broadcast::channel(16);
            Self {
                executed: Mutex::new(Vec::new()),
                logs,
                log_file,
            }
        }
    }

    impl ServerHost for FakeHost {
        fn players(&self) -> PlayerList {
            PlayerList {
                players: vec!["Notch".into(), "jeb_".into()],
                max: 20,
            }
        }

        fn cpu_usage(&self) -> f64 {
            12.5
        }

        fn ram_usage(&self) -> RamUsage {
            RamUsage {
                free: 512,
                used: 1536,
                max: 2048,
            }
        }

        fn ticks_per_second(&self) -> Option<f64> {
            Some(19.8)
        }

        fn execute(&self, line: &str) -> Result<(), HostError> {
            self.executed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(line.to_string());
            Ok(())
        }

        fn subscribe_logs(&self) -> broadcast::Receiver<String> {
            self.logs.subscribe()
        }

        fn log_file(&self) -> Option<PathBuf> {
            self.log_file.clone()
        }
    }
}
