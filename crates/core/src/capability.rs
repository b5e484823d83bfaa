//! Browser capability abstraction
//!
//! One capability controls one isolated browser context. The pool and session
//! layers only ever talk to these traits, so the whole lifecycle logic is
//! testable without a running browser. The production implementation lives in
//! `cdp::CdpCapability`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::interceptor::NetworkInterceptor;

/// Cookie in engine (camelCase) shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Options resolved by the pool before a capability is launched.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            proxy: None,
        }
    }
}

/// Operation surface of one live browser context.
///
/// Single-writer: the owning session serializes calls, the capability does
/// not add locking of its own.
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    /// Register a script evaluated before any page script on every new
    /// document. Must be called before the first navigation to be effective.
    async fn add_init_script(&self, script: &str) -> Result<()>;

    /// Wire the interceptor into the engine's network events. Passive; never
    /// fails the session.
    fn observe_network(&self, interceptor: Arc<NetworkInterceptor>);

    /// Navigate and return the final URL once the document has loaded.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<String>;

    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn content(&self) -> Result<String>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    async fn screenshot_page(&self, full_page: bool) -> Result<Vec<u8>>;

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>>;

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()>;

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    async fn cookies(&self, url: Option<&str>) -> Result<Vec<Cookie>>;

    /// Release engine resources. Each step is attempted independently;
    /// implementations log partial failures instead of aborting teardown.
    async fn close(&self) -> Result<()>;
}

/// Factory injected into the pool; launches one capability per session.
#[async_trait]
pub trait CapabilityLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserCapability>>;
}
