//! Browser session - one isolated automation context
//!
//! A session is the single owner of one capability handle and one network
//! interceptor. Operations are dispatched to the capability, refresh the
//! activity timestamp on success, and propagate failures unchanged in kind.
//! Callers must not issue concurrent operations against one session; the
//! capability is single-writer and the session adds no reentrancy guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use url::Url;

use crate::capability::{BrowserCapability, CapabilityLauncher, Cookie, LaunchOptions, Viewport};
use crate::error::{BrowserError, Result};
use crate::interceptor::{InterceptedRequest, NetworkInterceptor};
use crate::stealth;

/// Per-create options; `None` falls back to the pool defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub headless: Option<bool>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub viewport: Option<Viewport>,
}

impl SessionOptions {
    pub(crate) fn resolve(&self, defaults: &LaunchOptions) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless.unwrap_or(defaults.headless),
            viewport: self.viewport.unwrap_or(defaults.viewport),
            user_agent: self.user_agent.clone().or_else(|| defaults.user_agent.clone()),
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
        }
    }
}

pub struct BrowserSession {
    id: String,
    capability: RwLock<Option<Box<dyn BrowserCapability>>>,
    interceptor: Arc<NetworkInterceptor>,
    custom_headers: RwLock<HashMap<String, String>>,
    created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl BrowserSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            capability: RwLock::new(None),
            interceptor: Arc::new(NetworkInterceptor::new()),
            custom_headers: RwLock::new(HashMap::new()),
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_activity.read().await.elapsed()
    }

    pub fn interceptor(&self) -> &Arc<NetworkInterceptor> {
        &self.interceptor
    }

    /// Launch the capability and apply the anti-detection scripts, navigator
    /// patch first, vendor bundle second, before any navigation can happen.
    /// On failure the partial capability is torn down and the error surfaces;
    /// the session stays uninitialized.
    pub async fn initialize(
        &self,
        launcher: &dyn CapabilityLauncher,
        options: &LaunchOptions,
    ) -> Result<()> {
        let capability = launcher.launch(options).await?;

        if let Err(err) = capability.add_init_script(stealth::NAVIGATOR_PATCH).await {
            tracing::error!(session_id = %self.id, "navigator patch injection failed: {err}");
            self.discard(capability).await;
            return Err(err);
        }

        // Vendor bundle is best-effort: a missing or rejected script degrades
        // stealth, it does not fail the session.
        if let Some(source) = stealth::vendor_patch() {
            if let Err(err) = capability.add_init_script(&source).await {
                tracing::warn!(session_id = %self.id, "vendor stealth injection failed: {err}");
            }
        }

        capability.observe_network(Arc::clone(&self.interceptor));

        *self.capability.write().await = Some(capability);
        self.touch().await;
        tracing::info!(session_id = %self.id, "session initialized");
        Ok(())
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<String> {
        Url::parse(url)?;
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.navigate(url, timeout).await {
            Ok(final_url) => {
                drop(guard);
                self.touch().await;
                Ok(final_url)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, %url, "navigate failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn evaluate_script(&self, script: &str) -> Result<Value> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.evaluate(script).await {
            Ok(value) => {
                drop(guard);
                self.touch().await;
                Ok(value)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "script evaluation failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn content(&self) -> Result<String> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.content().await {
            Ok(html) => {
                drop(guard);
                self.touch().await;
                Ok(html)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "content fetch failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.wait_for_selector(selector, timeout).await {
            Ok(()) => {
                drop(guard);
                self.touch().await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, %selector, "wait for selector failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.click(selector).await {
            Ok(()) => {
                drop(guard);
                self.touch().await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, %selector, "click failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.type_text(selector, text).await {
            Ok(()) => {
                drop(guard);
                self.touch().await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, %selector, "type text failed: {err}");
                Err(err)
            }
        }
    }

    /// Screenshot of an element (when `selector` is given), the viewport, or
    /// the full page.
    pub async fn screenshot(&self, selector: Option<&str>, full_page: bool) -> Result<Vec<u8>> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        let result = match selector {
            Some(selector) => cap.screenshot_element(selector).await,
            None => cap.screenshot_page(full_page).await,
        };
        match result {
            Ok(bytes) => {
                drop(guard);
                self.touch().await;
                Ok(bytes)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "screenshot failed: {err}");
                Err(err)
            }
        }
    }

    /// Merge headers into the accumulated map, then apply the whole map to
    /// the capability. Repeated calls are additive, never a replacement.
    pub async fn set_extra_headers(&self, headers: HashMap<String, String>) -> Result<()> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;

        let merged = {
            let mut accumulated = self.custom_headers.write().await;
            accumulated.extend(headers);
            accumulated.clone()
        };

        match cap.set_extra_headers(&merged).await {
            Ok(()) => {
                drop(guard);
                self.touch().await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "set extra headers failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.set_cookies(cookies).await {
            Ok(()) => {
                drop(guard);
                self.touch().await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "set cookies failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn get_cookies(&self, url: Option<&str>) -> Result<Vec<Cookie>> {
        let guard = self.capability.read().await;
        let cap = guard.as_deref().ok_or(BrowserError::Uninitialized)?;
        match cap.cookies(url).await {
            Ok(cookies) => {
                drop(guard);
                self.touch().await;
                Ok(cookies)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, "get cookies failed: {err}");
                Err(err)
            }
        }
    }

    /// Completed intercepted traffic. A pattern installs the URL filter
    /// before the snapshot is taken.
    pub fn network_requests(&self, pattern: Option<&str>) -> Result<Vec<InterceptedRequest>> {
        if let Some(pattern) = pattern {
            self.interceptor.set_filter(pattern)?;
        }
        Ok(self.interceptor.completed_requests())
    }

    pub fn clear_network_requests(&self) {
        self.interceptor.clear();
    }

    /// Idempotent teardown. Capability release failures are logged, never
    /// propagated; the identifier is invalid afterwards either way.
    pub async fn close(&self) {
        let capability = self.capability.write().await.take();
        if let Some(capability) = capability {
            if let Err(err) = capability.close().await {
                tracing::warn!(session_id = %self.id, "capability teardown incomplete: {err}");
            }
            tracing::info!(session_id = %self.id, "session closed");
        }
    }

    async fn discard(&self, capability: Box<dyn BrowserCapability>) {
        if let Err(err) = capability.close().await {
            tracing::warn!(session_id = %self.id, "partial capability teardown incomplete: {err}");
        }
    }

    async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeLauncher;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn initialized_session() -> (BrowserSession, Arc<FakeLauncher>) {
        let launcher = Arc::new(FakeLauncher::new());
        let session = BrowserSession::new("test-session");
        session
            .initialize(launcher.as_ref(), &LaunchOptions::default())
            .await
            .expect("initialize");
        (session, launcher)
    }

    #[tokio::test]
    async fn initialize_injects_stealth_and_wires_the_interceptor() {
        let (session, launcher) = initialized_session().await;
        let capability = launcher.last_capability();

        let scripts = capability.init_scripts();
        assert!(!scripts.is_empty());
        assert!(scripts[0].contains("webdriver"));

        let observed = capability.observed_interceptor().expect("interceptor wired");
        assert!(Arc::ptr_eq(&observed, session.interceptor()));
    }

    #[tokio::test]
    async fn operations_require_initialization() {
        let session = BrowserSession::new("cold");
        let err = session
            .navigate("https://example.com", TIMEOUT)
            .await
            .expect_err("uninitialized navigate must fail");
        assert!(matches!(err, BrowserError::Uninitialized));
    }

    #[tokio::test]
    async fn navigate_rejects_malformed_urls() {
        let (session, launcher) = initialized_session().await;
        let err = session
            .navigate("not a url", TIMEOUT)
            .await
            .expect_err("malformed url must fail");
        assert!(matches!(err, BrowserError::InvalidUrl(_)));
        assert!(launcher.last_capability().navigations().is_empty());
    }

    #[tokio::test]
    async fn navigate_returns_final_url_and_touches_activity() {
        let (session, launcher) = initialized_session().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = session.idle_for().await;

        let final_url = session
            .navigate("https://example.com/start", TIMEOUT)
            .await
            .expect("navigate");
        assert_eq!(final_url, "https://example.com/start");
        assert_eq!(
            launcher.last_capability().navigations(),
            vec!["https://example.com/start".to_string()]
        );
        assert!(session.idle_for().await < before);
    }

    #[tokio::test]
    async fn headers_accumulate_across_calls() {
        let (session, launcher) = initialized_session().await;

        let mut first = HashMap::new();
        first.insert("x-first".to_string(), "1".to_string());
        session.set_extra_headers(first).await.expect("first merge");

        let mut second = HashMap::new();
        second.insert("x-second".to_string(), "2".to_string());
        session.set_extra_headers(second).await.expect("second merge");

        let applied = launcher.last_capability().last_applied_headers();
        assert_eq!(applied.get("x-first").map(String::as_str), Some("1"));
        assert_eq!(applied.get("x-second").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn element_screenshot_fails_for_missing_selector() {
        let (session, launcher) = initialized_session().await;
        launcher.last_capability().add_selector("#present");

        session
            .screenshot(Some("#present"), false)
            .await
            .expect("known selector screenshots");
        let err = session
            .screenshot(Some("#absent"), false)
            .await
            .expect_err("unknown selector must fail");
        assert!(matches!(err, BrowserError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn initialization_failure_tears_down_partial_capability() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.fail_init_scripts(true);

        let session = BrowserSession::new("doomed");
        session
            .initialize(launcher.as_ref(), &LaunchOptions::default())
            .await
            .expect_err("init script failure must surface");

        assert!(launcher.last_capability().is_closed());
        let err = session
            .navigate("https://example.com", TIMEOUT)
            .await
            .expect_err("session stays uninitialized");
        assert!(matches!(err, BrowserError::Uninitialized));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (session, launcher) = initialized_session().await;
        session.close().await;
        session.close().await;
        assert_eq!(launcher.last_capability().close_calls(), 1);

        let err = session
            .navigate("https://example.com", TIMEOUT)
            .await
            .expect_err("closed session rejects operations");
        assert!(matches!(err, BrowserError::Uninitialized));
    }

    #[tokio::test]
    async fn network_snapshot_applies_pattern_first() {
        let (session, _launcher) = initialized_session().await;
        let interceptor = Arc::clone(session.interceptor());

        interceptor.record_request(crate::interceptor::RequestEvent {
            url: "https://a.test/api/x".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        });
        interceptor.record_response(crate::interceptor::ResponseEvent {
            url: "https://a.test/api/x".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: Some(b"{}".to_vec()),
        });

        let requests = session
            .network_requests(Some("/api/"))
            .expect("pattern accepted");
        assert_eq!(requests.len(), 1);

        session.clear_network_requests();
        assert!(session.network_requests(None).expect("snapshot").is_empty());
    }
}
