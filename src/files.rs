//! 文件管理命令：列表、读取、写入、建目录、删除、重命名与下载。
//!
//! 文件引擎为阻塞 I/O，统一放到阻塞线程池执行，避免拖慢其他连接。

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::dispatch::{CommandContext, parse_payload};
use crate::error::CommandError;
use crate::response::{Envelope, STATUS_FILE_WRITE, STATUS_OK};
use crate::storage::{Storage, StorageError, display};

#[derive(Deserialize)]
pub(crate) struct PathRequest {
    path: String,
}

#[derive(Deserialize)]
pub(crate) struct WriteRequest {
    path: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameRequest {
    old_path: String,
    new_path: String,
}

async fn blocking<T, F>(ctx: &CommandContext, op: F) -> Result<T, CommandError>
where
    T: Send + 'static,
    F: FnOnce(&Storage) -> Result<T, StorageError> + Send + 'static,
{
    let storage: Arc<Storage> = ctx.storage.clone();
    tokio::task::spawn_blocking(move || op(&storage))
        .await
        .map_err(|err| CommandError::Internal(err.to_string()))?
        .map_err(|err| CommandError::from_storage(err, &ctx.phrases))
}

/// 空参数列出根目录；以 `{` 开头按 JSON 解析，否则视为原始路径。
fn list_target(ctx: &CommandContext, payload: &str) -> Result<Option<String>, CommandError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.starts_with('{') {
        let PathRequest { path } = parse_payload(payload, &ctx.phrases)?;
        return Ok(Some(path));
    }
    Ok(Some(payload.to_string()))
}

pub async fn list(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let target = list_target(ctx, payload)?;
    let (path, files) = blocking(ctx, move |storage| storage.list(target.as_deref())).await?;
    info!(path = %path.display(), count = files.len(), "list files");
    Ok(Envelope::file_list(
        ctx.phrases.phrase("file-list"),
        files,
        display(&path),
    ))
}

pub async fn read(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let PathRequest { path } = parse_payload(payload, &ctx.phrases)?;
    let content = blocking(ctx, move |storage| storage.read(&path)).await?;
    info!(path = %content.path, size = content.size, "read file");
    Ok(Envelope::file_read(ctx.phrases.phrase("file-read"), content))
}

pub async fn write(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let WriteRequest { path, content } = parse_payload(payload, &ctx.phrases)?;
    let (target, created) = blocking(ctx, move |storage| storage.write(&path, &content)).await?;
    info!(path = %target.display(), created, "write file");
    let message = if created { "file-created" } else { "file-updated" };
    Ok(Envelope::path(
        STATUS_FILE_WRITE,
        ctx.phrases.phrase(message),
        display(&target),
    ))
}

pub async fn create_folder(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let PathRequest { path } = parse_payload(payload, &ctx.phrases)?;
    let target = blocking(ctx, move |storage| storage.create_folder(&path)).await?;
    info!(path = %target.display(), "create folder");
    Ok(Envelope::path(
        STATUS_OK,
        ctx.phrases.phrase("folder-created"),
        display(&target),
    ))
}

pub async fn delete(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let PathRequest { path } = parse_payload(payload, &ctx.phrases)?;
    let target = blocking(ctx, move |storage| storage.delete(&path)).await?;
    info!(path = %target.display(), "delete entry");
    Ok(Envelope::path(
        STATUS_OK,
        ctx.phrases.phrase("file-deleted"),
        display(&target),
    ))
}

pub async fn rename(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let RenameRequest { old_path, new_path } = parse_payload(payload, &ctx.phrases)?;
    let target = blocking(ctx, move |storage| storage.rename(&old_path, &new_path)).await?;
    info!(path = %target.display(), "rename entry");
    Ok(Envelope::path(
        STATUS_OK,
        ctx.phrases.phrase("file-renamed"),
        display(&target),
    ))
}

pub async fn download(ctx: &CommandContext, payload: &str) -> Result<Envelope, CommandError> {
    let PathRequest { path } = parse_payload(payload, &ctx.phrases)?;
    let payload = blocking(ctx, move |storage| storage.download(&path)).await?;
    info!(path = %payload.path, size = payload.size, "download file");
    Ok(Envelope::file_download(
        ctx.phrases.phrase("file-download"),
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use crate::dispatch::testing::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde_json::json;

    async fn admin() -> Fixture {
        let fixture = fixture();
        send(&fixture, addr(1), ADMIN_LOGIN).await;
        fixture
    }

    fn command(name: &str, body: serde_json::Value) -> String {
        format!("{name}:{body}")
    }

    #[tokio::test]
    async fn list_accepts_json_and_raw_paths() {
        let fixture = admin().await;
        let logs = fixture.root.join("logs").to_string_lossy().to_string();

        let by_json = send(&fixture, addr(1), &command("FILE_LIST", json!({"path": "logs"}))).await;
        let by_raw = send(&fixture, addr(1), &format!("FILE_LIST:{logs}")).await;
        assert_eq!(by_json["status"], 2000);
        assert_eq!(by_json["files"], by_raw["files"]);
        assert_eq!(by_json["files"][0]["name"], "latest.log");
        assert_eq!(by_json["files"][0]["icon"], "file-text");

        let missing = send(&fixture, addr(1), &command("FILE_LIST", json!({"path": "nope"}))).await;
        assert_eq!(missing["status"], 404);
    }

    #[tokio::test]
    async fn list_with_wrongly_shaped_json_is_400() {
        let fixture = admin().await;
        for payload in [r#"{"path":5}"#, r#"{"dir":"logs"}"#, "{logs"] {
            let response = send(&fixture, addr(1), &format!("FILE_LIST:{payload}")).await;
            assert_eq!(response["status"], 400, "{payload}");
        }
    }

    #[tokio::test]
    async fn read_missing_is_404_but_escape_is_403() {
        let fixture = admin().await;
        let missing = send(&fixture, addr(1), &command("FILE_READ", json!({"path": "ghost.txt"}))).await;
        assert_eq!(missing["status"], 404);

        let outside = fixture.temp.path().join("ghost.txt").to_string_lossy().to_string();
        let escape = send(&fixture, addr(1), &command("FILE_READ", json!({"path": outside}))).await;
        assert_eq!(escape["status"], 403);
        let escape = send(&fixture, addr(1), &command("FILE_READ", json!({"path": "../../etc/passwd"}))).await;
        assert_eq!(escape["status"], 403);
    }

    #[tokio::test]
    async fn write_then_read_text() {
        let fixture = admin().await;
        let written = send(
            &fixture,
            addr(1),
            &command("FILE_WRITE", json!({"path": "ops.json", "content": "[\"alice\"]"})),
        )
        .await;
        assert_eq!(written["status"], 2002);
        assert_eq!(written["message"], "File created successfully");

        let read = send(&fixture, addr(1), &command("FILE_READ", json!({"path": "ops.json"}))).await;
        assert_eq!(read["status"], 2001);
        assert_eq!(read["content"], "[\"alice\"]");
        assert_eq!(read["encoding"], "utf8");
        assert_eq!(read["is_binary"], false);
    }

    #[tokio::test]
    async fn write_then_read_binary() {
        let fixture = admin().await;
        let raw = [0x89u8, b'P', b'N', b'G', 0, 0xff];
        let encoded = BASE64.encode(raw);
        send(
            &fixture,
            addr(1),
            &command("FILE_WRITE", json!({"path": "icon.png", "content": encoded})),
        )
        .await;

        let read = send(&fixture, addr(1), &command("FILE_READ", json!({"path": "icon.png"}))).await;
        assert_eq!(read["encoding"], "base64");
        assert_eq!(read["is_binary"], true);
        let decoded = BASE64.decode(read["content"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, raw);
    }

    #[tokio::test]
    async fn write_escape_as_admin_is_403_and_writes_nothing() {
        let fixture = admin().await;
        let target = format!("{}/../../etc/passwd", fixture.root.to_string_lossy());
        let response = send(
            &fixture,
            addr(1),
            &command("FILE_WRITE", json!({"path": target, "content": "x"})),
        )
        .await;
        assert_eq!(response["status"], 403);

        let response = send(
            &fixture,
            addr(1),
            &command("FILE_WRITE", json!({"path": "../escaped.txt", "content": "x"})),
        )
        .await;
        assert_eq!(response["status"], 403);
        assert!(!fixture.temp.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn folder_lifecycle() {
        let fixture = admin().await;
        let created = send(
            &fixture,
            addr(1),
            &command("FILE_CREATE_FOLDER", json!({"path": "plugins/Dynmap"})),
        )
        .await;
        assert_eq!(created["status"], 200);
        assert!(fixture.root.join("plugins/Dynmap").is_dir());

        let again = send(
            &fixture,
            addr(1),
            &command("FILE_CREATE_FOLDER", json!({"path": "plugins/Dynmap"})),
        )
        .await;
        assert_eq!(again["status"], 500);

        let renamed = send(
            &fixture,
            addr(1),
            &command("FILE_RENAME", json!({"oldPath": "plugins", "newPath": "mods"})),
        )
        .await;
        assert_eq!(renamed["status"], 200);
        assert!(fixture.root.join("mods/Dynmap").is_dir());

        let deleted = send(&fixture, addr(1), &command("FILE_DELETE", json!({"path": "mods"}))).await;
        assert_eq!(deleted["status"], 200);
        assert!(!fixture.root.join("mods").exists());
    }

    #[tokio::test]
    async fn root_is_protected_for_admins() {
        let fixture = admin().await;
        let root = fixture.root.to_string_lossy().to_string();
        let delete = send(&fixture, addr(1), &command("FILE_DELETE", json!({"path": root}))).await;
        assert_eq!(delete["status"], 403);
        let rename = send(
            &fixture,
            addr(1),
            &command("FILE_RENAME", json!({"oldPath": ".", "newPath": "elsewhere"})),
        )
        .await;
        assert_eq!(rename["status"], 403);
        assert!(fixture.root.join("secret.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_through_dangling_symlink_is_403() {
        let fixture = admin().await;
        let outside = fixture.temp.path().join("outside-created.txt");
        std::os::unix::fs::symlink(&outside, fixture.root.join("dangle.txt")).unwrap();

        let response = send(
            &fixture,
            addr(1),
            &command("FILE_WRITE", json!({"path": "dangle.txt", "content": "pwned"})),
        )
        .await;
        assert_eq!(response["status"], 403);
        assert!(!outside.exists());
    }

    #[tokio::test]
    async fn rename_target_outside_root_is_403() {
        let fixture = admin().await;
        let outside = fixture.temp.path().join("stolen.txt").to_string_lossy().to_string();
        let response = send(
            &fixture,
            addr(1),
            &command("FILE_RENAME", json!({"oldPath": "secret.txt", "newPath": outside})),
        )
        .await;
        assert_eq!(response["status"], 403);
        assert!(fixture.root.join("secret.txt").exists());
    }

    #[tokio::test]
    async fn download_returns_base64_payload() {
        let fixture = admin().await;
        let response = send(
            &fixture,
            addr(1),
            &command("FILE_DOWNLOAD", json!({"path": "server.properties"})),
        )
        .await;
        assert_eq!(response["status"], 2003);
        assert_eq!(response["filename"], "server.properties");
        assert_eq!(response["size"], 7);
        let decoded = BASE64.decode(response["content"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"motd=hi");
    }

    #[tokio::test]
    async fn oversized_download_is_500_with_limit() {
        let fixture = admin().await;
        let file = std::fs::File::create(fixture.root.join("world.zip")).unwrap();
        file.set_len(60 * 1024 * 1024).unwrap();

        let response = send(
            &fixture,
            addr(1),
            &command("FILE_DOWNLOAD", json!({"path": "world.zip"})),
        )
        .await;
        assert_eq!(response["status"], 500);
        assert!(response["message"].as_str().unwrap().contains("50MB"));
        assert!(response.get("content").is_none());
    }
}
