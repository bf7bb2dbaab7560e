//! 会话注册表、账户校验、登录限流与 LOGIN/LOGOUT 命令。

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::dispatch::CommandContext;
use crate::error::CommandError;
use crate::response::{Envelope, STATUS_OK};

/// 权限等级，按 Guest < User < Admin 全序比较。
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Guest,
    #[value(alias = "viewer")]
    User,
    Admin,
}

#[derive(Clone)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"***")
            .field("role", &self.role)
            .finish()
    }
}

impl FromStr for Account {
    type Err = String;

    /// 解析 `ROLE:USERNAME:PASSWORD`，密码中允许出现冒号。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.trim().splitn(3, ':');
        let (Some(role), Some(username), Some(password)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err("expected ROLE:USERNAME:PASSWORD".into());
        };
        let role = <Role as ValueEnum>::from_str(role, true).map_err(|_| format!("unknown role: {role}"))?;
        if role == Role::Guest {
            return Err("accounts must be admin or user".into());
        }
        if username.is_empty() || password.is_empty() {
            return Err("username and password must not be empty".into());
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            role,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectedUser {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl Credentials {
    /// JSON 对象形式，或兼容旧客户端的纯密码形式。
    pub fn parse(payload: &str) -> Option<Self> {
        let payload = payload.trim();
        if payload.is_empty() {
            return None;
        }
        if payload.starts_with('{') {
            return serde_json::from_str(payload).ok();
        }
        Some(Self {
            username: None,
            password: payload.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("too many login attempts, retry in {0}s")]
    LockedOut(u64),
}

#[derive(Clone, Copy, Debug)]
pub struct LoginLimits {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
}

#[derive(Debug)]
pub struct LoginAttempt {
    pub window_start: Instant,
    pub failures: u32,
    pub locked_until: Option<Instant>,
}

/// 连接地址到已登录用户的映射；未登录等同于 Guest。
#[derive(Debug)]
pub struct SessionRegistry {
    accounts: Vec<Account>,
    sessions: Mutex<HashMap<SocketAddr, ConnectedUser>>,
    login_attempts: Mutex<HashMap<IpAddr, LoginAttempt>>,
    limits: LoginLimits,
}

impl SessionRegistry {
    pub fn new(accounts: Vec<Account>, limits: LoginLimits) -> Self {
        Self {
            accounts,
            sessions: Mutex::new(HashMap::new()),
            login_attempts: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// 校验凭据并为该地址创建（或替换）会话。
    pub async fn login(
        &self,
        addr: SocketAddr,
        credentials: &Credentials,
    ) -> Result<ConnectedUser, LoginError> {
        if let Some(retry_after) = self.check_login_rate_limit(addr.ip()).await {
            return Err(LoginError::LockedOut(retry_after));
        }

        let Some(account) = self.find_account(credentials) else {
            self.register_login_failure(addr.ip()).await;
            return Err(LoginError::InvalidCredentials);
        };
        self.clear_login_failures(addr.ip()).await;

        let user = ConnectedUser {
            username: account.username.clone(),
            role: account.role,
        };
        self.sessions.lock().await.insert(addr, user.clone());
        Ok(user)
    }

    fn find_account(&self, credentials: &Credentials) -> Option<&Account> {
        self.accounts.iter().find(|account| {
            account.password == credentials.password
                && credentials
                    .username
                    .as_deref()
                    .is_none_or(|username| username == account.username)
        })
    }

    pub async fn get(&self, addr: SocketAddr) -> Option<ConnectedUser> {
        self.sessions.lock().await.get(&addr).cloned()
    }

    pub async fn role_of(&self, addr: SocketAddr) -> Role {
        self.get(addr)
            .await
            .map(|user| user.role)
            .unwrap_or(Role::Guest)
    }

    pub async fn remove(&self, addr: SocketAddr) -> Option<ConnectedUser> {
        self.sessions.lock().await.remove(&addr)
    }

    pub async fn logged_in(&self) -> Vec<SocketAddr> {
        self.sessions.lock().await.keys().copied().collect()
    }

    async fn check_login_rate_limit(&self, ip: IpAddr) -> Option<u64> {
        if self.limits.max_attempts == 0 {
            return None;
        }

        let mut attempts = self.login_attempts.lock().await;
        let now = Instant::now();
        let entry = attempts.entry(ip).or_insert(LoginAttempt {
            window_start: now,
            failures: 0,
            locked_until: None,
        });

        if let Some(locked_until) = entry.locked_until {
            if now < locked_until {
                return Some(locked_until.saturating_duration_since(now).as_secs().max(1));
            }
            entry.locked_until = None;
            entry.failures = 0;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) > self.limits.window {
            entry.window_start = now;
            entry.failures = 0;
        }

        None
    }

    async fn register_login_failure(&self, ip: IpAddr) {
        if self.limits.max_attempts == 0 {
            return;
        }

        let mut attempts = self.login_attempts.lock().await;
        let now = Instant::now();
        let entry = attempts.entry(ip).or_insert(LoginAttempt {
            window_start: now,
            failures: 0,
            locked_until: None,
        });

        if now.duration_since(entry.window_start) > self.limits.window {
            entry.window_start = now;
            entry.failures = 0;
            entry.locked_until = None;
        }

        entry.failures = entry.failures.saturating_add(1);
        if entry.failures >= self.limits.max_attempts {
            entry.locked_until = Some(now + self.limits.lockout);
            warn!(client_ip = %ip, "login locked out");
        }
    }

    async fn clear_login_failures(&self, ip: IpAddr) {
        self.login_attempts.lock().await.remove(&ip);
    }

    /// 清理过期的登录失败记录。
    pub async fn prune_login_attempts(&self) {
        let mut attempts = self.login_attempts.lock().await;
        let now = Instant::now();
        let window = self.limits.window;
        attempts.retain(|_, entry| {
            if let Some(locked_until) = entry.locked_until {
                return locked_until > now;
            }
            now.duration_since(entry.window_start) <= window
        });
    }
}

/// LOGIN：失败时不区分用户名错误还是密码错误。
pub async fn handle_login(
    ctx: &CommandContext,
    addr: SocketAddr,
    payload: &str,
) -> Result<Envelope, CommandError> {
    let credentials = Credentials::parse(payload)
        .ok_or_else(|| CommandError::BadRequest(ctx.phrases.phrase("missing-parameters")))?;

    match ctx.sessions.login(addr, &credentials).await {
        Ok(user) => {
            info!(%addr, username = %user.username, role = ?user.role, "login succeeded");
            Ok(Envelope::logged_in(
                ctx.phrases.phrase("logged-in"),
                user.username,
                user.role,
            ))
        }
        Err(LoginError::InvalidCredentials) => {
            warn!(%addr, "login failed");
            Err(CommandError::Unauthorized(ctx.phrases.phrase("login-failed")))
        }
        Err(err @ LoginError::LockedOut(_)) => {
            warn!(%addr, "login throttled");
            Err(CommandError::TooManyRequests(format!(
                "{} ({err})",
                ctx.phrases.phrase("login-throttled")
            )))
        }
    }
}

pub async fn handle_logout(ctx: &CommandContext, addr: SocketAddr) -> Envelope {
    if let Some(user) = ctx.sessions.remove(addr).await {
        info!(%addr, username = %user.username, "logout");
    }
    Envelope::message(
        STATUS_OK,
        ctx.phrases.phrase("logged-out"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role, username: &str, password: &str) -> Account {
        Account {
            username: username.into(),
            password: password.into(),
            role,
        }
    }

    fn registry(max_attempts: u32) -> SessionRegistry {
        SessionRegistry::new(
            vec![
                account(Role::Admin, "alice", "root-pw"),
                account(Role::User, "bob", "view-pw"),
            ],
            LoginLimits {
                max_attempts,
                window: Duration::from_secs(60),
                lockout: Duration::from_secs(60),
            },
        )
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn creds(username: Option<&str>, password: &str) -> Credentials {
        Credentials {
            username: username.map(str::to_string),
            password: password.into(),
        }
    }

    #[test]
    fn roles_are_totally_ordered() {
        assert!(Role::Guest < Role::User);
        assert!(Role::User < Role::Admin);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
    }

    #[test]
    fn parses_both_credential_forms() {
        let json = Credentials::parse(r#"{"username":"alice","password":"pw"}"#).unwrap();
        assert_eq!(json.username.as_deref(), Some("alice"));
        let bare = Credentials::parse("pw").unwrap();
        assert_eq!(bare.username, None);
        assert_eq!(bare.password, "pw");
        assert!(Credentials::parse("  ").is_none());
        assert!(Credentials::parse("{broken").is_none());
    }

    #[test]
    fn account_debug_hides_password() {
        let debug = format!("{:?}", account(Role::Admin, "alice", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn login_creates_session_per_address() {
        let sessions = registry(0);
        assert_eq!(sessions.role_of(addr(1)).await, Role::Guest);

        let user = sessions
            .login(addr(1), &creds(Some("alice"), "root-pw"))
            .await
            .expect("login");
        assert_eq!(user.role, Role::Admin);
        assert_eq!(sessions.role_of(addr(1)).await, Role::Admin);
        assert_eq!(sessions.role_of(addr(2)).await, Role::Guest);

        let user = sessions
            .login(addr(1), &creds(None, "view-pw"))
            .await
            .expect("relogin");
        assert_eq!(user.username, "bob");
        assert_eq!(sessions.get(addr(1)).await, Some(user));
        assert_eq!(sessions.logged_in().await, vec![addr(1)]);
    }

    #[tokio::test]
    async fn wrong_username_or_password_fails_identically() {
        let sessions = registry(0);
        let wrong_user = sessions.login(addr(1), &creds(Some("mallory"), "root-pw")).await;
        let wrong_pass = sessions.login(addr(1), &creds(Some("alice"), "nope")).await;
        assert!(matches!(wrong_user, Err(LoginError::InvalidCredentials)));
        assert!(matches!(wrong_pass, Err(LoginError::InvalidCredentials)));
        assert_eq!(sessions.get(addr(1)).await, None);
    }

    #[tokio::test]
    async fn remove_evicts_session() {
        let sessions = registry(0);
        sessions
            .login(addr(7), &creds(None, "root-pw"))
            .await
            .expect("login");
        assert!(sessions.remove(addr(7)).await.is_some());
        assert_eq!(sessions.get(addr(7)).await, None);
        assert_eq!(sessions.role_of(addr(7)).await, Role::Guest);
    }

    #[tokio::test]
    async fn throttle_locks_out_after_max_failures() {
        let sessions = registry(2);
        for _ in 0..2 {
            let result = sessions.login(addr(1), &creds(None, "bad")).await;
            assert!(matches!(result, Err(LoginError::InvalidCredentials)));
        }
        let result = sessions.login(addr(2), &creds(None, "root-pw")).await;
        assert!(matches!(result, Err(LoginError::LockedOut(_))));

        sessions.prune_login_attempts().await;
        let result = sessions.login(addr(2), &creds(None, "root-pw")).await;
        assert!(matches!(result, Err(LoginError::LockedOut(_))));
    }
}
