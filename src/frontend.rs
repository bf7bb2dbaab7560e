//! 嵌入式控制台页面与 SPA 回退。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "frontend/dist"]
/// 嵌入式前端构建产物。
pub struct FrontendAssets;

/// 非 WebSocket 请求的回退处理器。
pub async fn serve_frontend(req: Request<AxumBody>) -> Response {
    let path = req.uri().path().trim_start_matches('/');
    let requested = if path.is_empty() { "index.html" } else { path };
    if let Some(response) = load_embedded_asset(requested) {
        return response;
    }

    if !requested.contains('.')
        && let Some(response) = load_embedded_asset("index.html")
    {
        return response;
    }

    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn load_embedded_asset(path: &str) -> Option<Response> {
    let asset = FrontendAssets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(mime.essence_str())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    Some((headers, AxumBody::from(asset.data.into_owned())).into_response())
}
