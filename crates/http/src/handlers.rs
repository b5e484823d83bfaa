//! Request handlers and wire DTOs
//!
//! Thin translation layer: deserialize, call into the pool/session contract,
//! marshal the result back into the response envelope. No browser logic
//! lives here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use relay_core::{
    BrowserError, BrowserPool, BrowserSession, Cookie, InterceptedRequest, SessionOptions,
    Viewport,
};

use crate::error::ApiError;

type PoolState = State<Arc<BrowserPool>>;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub headless: Option<bool>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

impl AckResponse {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

#[derive(Debug, Serialize)]
pub struct NavigateResponse {
    pub success: bool,
    pub message: String,
    pub final_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteScriptRequest {
    pub script: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteScriptResponse {
    pub success: bool,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct PageContentResponse {
    pub success: bool,
    pub html: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetworkRequestsRequest {
    pub url_pattern: Option<String>,
}

/// Flattened intercepted-traffic record, original wire shape.
#[derive(Debug, Serialize)]
pub struct NetworkRequestDto {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub post_data: Option<String>,
    pub status_code: Option<u16>,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<String>,
    pub timestamp: f64,
}

impl From<InterceptedRequest> for NetworkRequestDto {
    fn from(record: InterceptedRequest) -> Self {
        let (status_code, response_headers, response_body) = match record.response {
            Some(response) => (Some(response.status), response.headers, response.body),
            None => (None, HashMap::new(), None),
        };
        Self {
            request_id: record.request_id,
            url: record.url,
            method: record.method,
            headers: record.headers,
            post_data: record.body,
            status_code,
            response_headers,
            response_body,
            timestamp: record.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NetworkRequestsResponse {
    pub success: bool,
    pub requests: Vec<NetworkRequestDto>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct WaitForElementRequest {
    pub selector: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct ClickElementRequest {
    pub selector: String,
}

#[derive(Debug, Deserialize)]
pub struct TypeTextRequest {
    pub selector: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TakeScreenshotRequest {
    pub selector: Option<String>,
    pub full_page: bool,
}

#[derive(Debug, Serialize)]
pub struct ScreenshotResponse {
    pub success: bool,
    /// PNG payload, base64-encoded.
    pub image_data: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SetHeadersRequest {
    pub headers: HashMap<String, String>,
}

/// Cookie in wire (snake_case) shape; the engine side is camelCase.
#[derive(Debug, Serialize, Deserialize)]
pub struct CookieDto {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl From<CookieDto> for Cookie {
    fn from(dto: CookieDto) -> Self {
        Self {
            name: dto.name,
            value: dto.value,
            domain: dto.domain,
            path: dto.path,
            expires: dto.expires,
            http_only: dto.http_only,
            secure: dto.secure,
            same_site: dto.same_site,
        }
    }
}

impl From<Cookie> for CookieDto {
    fn from(cookie: Cookie) -> Self {
        Self {
            name: cookie.name,
            value: cookie.value,
            domain: cookie.domain,
            path: cookie.path,
            expires: cookie.expires,
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: cookie.same_site,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetCookiesRequest {
    pub cookies: Vec<CookieDto>,
}

#[derive(Debug, Serialize)]
pub struct GetCookiesResponse {
    pub success: bool,
    pub cookies: Vec<CookieDto>,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CookiesQuery {
    pub url: Option<String>,
}

async fn lookup(pool: &BrowserPool, id: &str) -> Result<Arc<BrowserSession>, ApiError> {
    pool.get_session(id)
        .await
        .ok_or_else(|| ApiError::from(BrowserError::SessionNotFound(id.to_string())))
}

pub async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "browser-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(pool): PoolState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": pool.active_sessions().await,
    }))
}

pub async fn create_session(
    State(pool): PoolState,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let viewport = match (request.width, request.height) {
        (Some(width), Some(height)) => Some(Viewport { width, height }),
        _ => None,
    };
    let session_id = pool
        .create_session(SessionOptions {
            headless: request.headless,
            user_agent: request.user_agent,
            proxy: request.proxy,
            viewport,
        })
        .await?;
    Ok(Json(CreateSessionResponse {
        session_id,
        success: true,
        message: "session created".to_string(),
    }))
}

pub async fn close_session(
    State(pool): PoolState,
    Path(session_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    if pool.close_session(&session_id).await {
        Ok(Json(AckResponse::ok("session closed")))
    } else {
        Err(BrowserError::SessionNotFound(session_id).into())
    }
}

pub async fn navigate(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<NavigateResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let final_url = session
        .navigate(&request.url, Duration::from_secs(request.timeout))
        .await?;
    Ok(Json(NavigateResponse {
        success: true,
        message: "navigation complete".to_string(),
        final_url,
    }))
}

pub async fn execute_script(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<ExecuteScriptRequest>,
) -> Result<Json<ExecuteScriptResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let result = session.evaluate_script(&request.script).await?;
    Ok(Json(ExecuteScriptResponse {
        success: true,
        result,
    }))
}

pub async fn page_content(
    State(pool): PoolState,
    Path(session_id): Path<String>,
) -> Result<Json<PageContentResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let html = session.content().await?;
    Ok(Json(PageContentResponse {
        success: true,
        html,
        message: "content retrieved".to_string(),
    }))
}

pub async fn network_requests(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<NetworkRequestsRequest>,
) -> Result<Json<NetworkRequestsResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let requests = session.network_requests(request.url_pattern.as_deref())?;
    let requests: Vec<NetworkRequestDto> = requests.into_iter().map(Into::into).collect();
    Ok(Json(NetworkRequestsResponse {
        success: true,
        message: format!("{} requests captured", requests.len()),
        requests,
    }))
}

pub async fn clear_network_requests(
    State(pool): PoolState,
    Path(session_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    session.clear_network_requests();
    Ok(Json(AckResponse::ok("network records cleared")))
}

pub async fn wait_for_element(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<WaitForElementRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    session
        .wait_for_selector(&request.selector, Duration::from_secs(request.timeout))
        .await?;
    Ok(Json(AckResponse::ok("element present")))
}

pub async fn click_element(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<ClickElementRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    session.click(&request.selector).await?;
    Ok(Json(AckResponse::ok("clicked")))
}

pub async fn type_text(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<TypeTextRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    session.type_text(&request.selector, &request.text).await?;
    Ok(Json(AckResponse::ok("text entered")))
}

pub async fn take_screenshot(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<TakeScreenshotRequest>,
) -> Result<Json<ScreenshotResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let image = session
        .screenshot(request.selector.as_deref(), request.full_page)
        .await?;
    Ok(Json(ScreenshotResponse {
        success: true,
        image_data: BASE64.encode(image),
        message: "screenshot captured".to_string(),
    }))
}

pub async fn set_headers(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<SetHeadersRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    session.set_extra_headers(request.headers).await?;
    Ok(Json(AckResponse::ok("headers applied")))
}

pub async fn set_cookies(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Json(request): Json<SetCookiesRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let cookies: Vec<Cookie> = request.cookies.into_iter().map(Into::into).collect();
    session.set_cookies(&cookies).await?;
    Ok(Json(AckResponse::ok("cookies applied")))
}

pub async fn get_cookies(
    State(pool): PoolState,
    Path(session_id): Path<String>,
    Query(query): Query<CookiesQuery>,
) -> Result<Json<GetCookiesResponse>, ApiError> {
    let session = lookup(&pool, &session_id).await?;
    let cookies = session.get_cookies(query.url.as_deref()).await?;
    Ok(Json(GetCookiesResponse {
        success: true,
        cookies: cookies.into_iter().map(Into::into).collect(),
        message: "cookies retrieved".to_string(),
    }))
}
