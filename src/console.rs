//! 控制台命令与日志推送：EXEC、READLOGFILE，以及向已登录连接广播服务器输出。

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::CommandContext;
use crate::error::CommandError;
use crate::response::Envelope;
use crate::socket::ConsoleState;

/// 成功时不回复，执行结果经由日志流返回。
pub fn exec(ctx: &CommandContext, addr: SocketAddr, payload: &str) -> Result<(), CommandError> {
    let line = payload.trim();
    if line.is_empty() {
        return Err(CommandError::BadRequest(ctx.phrases.phrase("missing-parameters")));
    }
    ctx.host.execute(line).map_err(|err| {
        warn!(%addr, error = %err, "console command rejected");
        CommandError::Internal(ctx.phrases.phrase("console-unavailable"))
    })?;
    info!(%addr, command = line, "console command executed");
    Ok(())
}

/// 整个日志文件作为一条控制台输出返回。
pub async fn read_log_file(ctx: &CommandContext) -> Result<Envelope, CommandError> {
    let not_found = || CommandError::NotFound(ctx.phrases.phrase("log-file-not-found"));
    let Some(path) = ctx.host.log_file() else {
        return Err(not_found());
    };

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "log file missing");
            return Err(not_found());
        }
        Err(err) => return Err(CommandError::Internal(err.to_string())),
    };
    ctx.storage
        .check_transfer_size(metadata.len())
        .map_err(|err| CommandError::from_storage(err, &ctx.phrases))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|err| CommandError::Internal(err.to_string()))?;
    Ok(Envelope::console_output(
        String::from_utf8_lossy(&bytes).into_owned(),
    ))
}

/// 订阅宿主日志流并推送给当前所有已登录连接。
pub fn spawn_log_broadcast(state: Arc<ConsoleState>) -> JoinHandle<()> {
    let mut logs = state.dispatcher().context().host.subscribe_logs();
    tokio::spawn(async move {
        loop {
            match logs.recv().await {
                Ok(line) => {
                    let envelope = Envelope::console_output(line);
                    state.send_to_sessions(&envelope).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console log broadcast lagged");
                }
                Err(RecvError::Closed) => {
                    info!("console log stream closed");
                    break;
                }
            }
        }
    })
}
