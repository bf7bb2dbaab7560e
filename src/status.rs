//! 状态查询命令：在线玩家、CPU、内存与 TPS。

use std::sync::Arc;

use crate::dispatch::CommandContext;
use crate::error::CommandError;
use crate::host::{RamUsage, ServerHost};
use crate::response::Envelope;

pub fn players(ctx: &CommandContext) -> Envelope {
    Envelope::players(ctx.phrases.phrase("players"), ctx.host.players())
}

/// 采样会刷新系统信息，放到阻塞线程池执行。
async fn sample<T, F>(ctx: &CommandContext, probe: F) -> Result<T, CommandError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ServerHost) -> T + Send + 'static,
{
    let host: Arc<dyn ServerHost> = ctx.host.clone();
    tokio::task::spawn_blocking(move || probe(host.as_ref()))
        .await
        .map_err(|err| CommandError::Internal(err.to_string()))
}

pub async fn cpu_usage(ctx: &CommandContext) -> Result<Envelope, CommandError> {
    let usage = sample(ctx, |host| host.cpu_usage()).await?;
    Ok(Envelope::cpu_usage(ctx.phrases.phrase("cpu-usage"), usage))
}

pub async fn ram_usage(ctx: &CommandContext) -> Result<Envelope, CommandError> {
    let ram: RamUsage = sample(ctx, |host| host.ram_usage()).await?;
    Ok(Envelope::ram_usage(ctx.phrases.phrase("ram-usage"), ram))
}

pub fn tps(ctx: &CommandContext) -> Envelope {
    Envelope::tps(ctx.phrases.phrase("tps"), ctx.host.ticks_per_second())
}

#[cfg(test)]
mod tests {
    use crate::dispatch::testing::*;

    #[tokio::test]
    async fn status_commands_report_host_metrics() {
        let fixture = fixture();
        send(&fixture, addr(1), USER_LOGIN).await;

        let players = send(&fixture, addr(1), "PLAYERS").await;
        assert_eq!(players["status"], 1000);
        assert_eq!(players["connectedPlayers"], 2);
        assert_eq!(players["maxPlayers"], 20);
        assert_eq!(players["players"][1], "jeb_");

        let cpu = send(&fixture, addr(1), "CPUUSAGE").await;
        assert_eq!(cpu["status"], 1001);
        assert_eq!(cpu["usage"], 12.5);

        let ram = send(&fixture, addr(1), "RAMUSAGE").await;
        assert_eq!(ram["status"], 1002);
        assert_eq!(ram["free"], 512);
        assert_eq!(ram["used"], 1536);
        assert_eq!(ram["max"], 2048);

        let tps = send(&fixture, addr(1), "TPS").await;
        assert_eq!(tps["status"], 1003);
        assert_eq!(tps["tps"], 19.8);
    }

    #[tokio::test]
    async fn status_commands_need_login() {
        let fixture = fixture();
        for command in ["PLAYERS", "CPUUSAGE", "RAMUSAGE", "TPS"] {
            assert_eq!(send(&fixture, addr(1), command).await["status"], 403, "{command}");
        }
    }
}
