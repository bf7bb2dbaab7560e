//! 命令分派：解析消息、查表、鉴权、解析参数、调用处理器并渲染错误。

use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{self, SessionRegistry};
use crate::commands::{CommandKind, CommandRegistry};
use crate::console;
use crate::error::CommandError;
use crate::files;
use crate::host::ServerHost;
use crate::phrases::Phrases;
use crate::response::{Envelope, STATUS_BAD_REQUEST, STATUS_INTERNAL};
use crate::status;
use crate::storage::Storage;

/// 处理器可用的共享状态，由服务实例显式构建并持有。
pub struct CommandContext {
    pub sessions: Arc<SessionRegistry>,
    pub storage: Arc<Storage>,
    pub host: Arc<dyn ServerHost>,
    pub phrases: Arc<Phrases>,
}

pub struct Dispatcher {
    registry: CommandRegistry,
    context: CommandContext,
}

/// 拆分 `COMMAND` 或 `COMMAND:PAYLOAD`，只在第一个冒号处切分。
pub fn split_message(raw: &str) -> (&str, &str) {
    match raw.split_once(':') {
        Some((name, payload)) => (name.trim(), payload),
        None => (raw.trim(), ""),
    }
}

/// 将 JSON 参数解析为处理器需要的结构。
pub fn parse_payload<T: DeserializeOwned>(
    payload: &str,
    phrases: &Phrases,
) -> Result<T, CommandError> {
    if payload.trim().is_empty() {
        return Err(CommandError::BadRequest(phrases.phrase("missing-parameters")));
    }
    serde_json::from_str(payload)
        .map_err(|_| CommandError::BadRequest(phrases.phrase("invalid-parameters")))
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, context: CommandContext) -> Self {
        Self { registry, context }
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    /// 每条入站消息最多产生一个响应；`None` 表示无需回复。
    pub async fn dispatch(&self, addr: SocketAddr, raw: &str) -> Option<Envelope> {
        let phrases = &self.context.phrases;
        let (name, payload) = split_message(raw);
        let Some(command) = self.registry.get(name).copied() else {
            debug!(%addr, command = name, "unknown command");
            return Some(Envelope::message(
                STATUS_BAD_REQUEST,
                phrases.phrase("unknown-command"),
            ));
        };

        let role = self.context.sessions.role_of(addr).await;
        if role < command.required {
            warn!(%addr, command = command.name, ?role, required = ?command.required, "permission denied");
            return Some(CommandError::Forbidden(phrases.phrase("no-send-permission")).into_envelope());
        }

        debug!(%addr, command = command.name, "dispatch command");
        match self.invoke(addr, command.kind, payload).await {
            Ok(envelope) => {
                if let Some(envelope) = &envelope {
                    debug!(%addr, command = command.name, status = envelope.status(), "command completed");
                }
                envelope
            }
            Err(err) => {
                let status = err.status();
                if status >= STATUS_INTERNAL {
                    warn!(%addr, command = command.name, status, error = %err, "command failed");
                } else {
                    debug!(%addr, command = command.name, status, error = %err, "command rejected");
                }
                Some(err.into_envelope())
            }
        }
    }

    async fn invoke(
        &self,
        addr: SocketAddr,
        kind: CommandKind,
        payload: &str,
    ) -> Result<Option<Envelope>, CommandError> {
        let ctx = &self.context;
        let envelope = match kind {
            CommandKind::Login => auth::handle_login(ctx, addr, payload).await?,
            CommandKind::Logout => auth::handle_logout(ctx, addr).await,
            CommandKind::Exec => return console::exec(ctx, addr, payload).map(|()| None),
            CommandKind::Players => status::players(ctx),
            CommandKind::CpuUsage => status::cpu_usage(ctx).await?,
            CommandKind::RamUsage => status::ram_usage(ctx).await?,
            CommandKind::Tps => status::tps(ctx),
            CommandKind::ReadLogFile => console::read_log_file(ctx).await?,
            CommandKind::FileList => files::list(ctx, payload).await?,
            CommandKind::FileRead => files::read(ctx, payload).await?,
            CommandKind::FileWrite => files::write(ctx, payload).await?,
            CommandKind::FileCreateFolder => files::create_folder(ctx, payload).await?,
            CommandKind::FileDelete => files::delete(ctx, payload).await?,
            CommandKind::FileRename => files::rename(ctx, payload).await?,
            CommandKind::FileDownload => files::download(ctx, payload).await?,
        };
        Ok(Some(envelope))
    }
}
