//! Fake capability and launcher for tests
//!
//! Hand-rolled test doubles: the pool and session logic (capacity, expiry,
//! header accumulation, correlation) is exercised without a browser process.
//! Available to downstream crates through the `test-util` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::{BrowserCapability, CapabilityLauncher, Cookie, LaunchOptions};
use crate::error::{BrowserError, Result};
use crate::interceptor::NetworkInterceptor;

/// In-memory capability: records every call, knows a configurable set of
/// selectors, and can be told to reject init scripts.
#[derive(Default)]
pub struct FakeCapability {
    reject_init_scripts: AtomicBool,
    init_scripts: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    applied_headers: Mutex<Vec<HashMap<String, String>>>,
    cookie_jar: Mutex<Vec<Cookie>>,
    selectors: Mutex<HashSet<String>>,
    interceptor: Mutex<Option<Arc<NetworkInterceptor>>>,
    close_calls: AtomicUsize,
}

impl FakeCapability {
    pub fn add_selector(&self, selector: &str) {
        self.selectors.lock().unwrap().insert(selector.to_string());
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().unwrap().clone()
    }

    /// The full header map from the most recent apply call.
    pub fn last_applied_headers(&self) -> HashMap<String, String> {
        self.applied_headers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn observed_interceptor(&self) -> Option<Arc<NetworkInterceptor>> {
        self.interceptor.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }

    fn has_selector(&self, selector: &str) -> bool {
        self.selectors.lock().unwrap().contains(selector)
    }
}

#[async_trait]
impl BrowserCapability for Arc<FakeCapability> {
    async fn add_init_script(&self, script: &str) -> Result<()> {
        if self.reject_init_scripts.load(Ordering::SeqCst) {
            return Err(BrowserError::Capability("init script rejected".to_string()));
        }
        self.init_scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }

    fn observe_network(&self, interceptor: Arc<NetworkInterceptor>) {
        *self.interceptor.lock().unwrap() = Some(interceptor);
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<String> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(url.to_string())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        Ok(json!({ "evaluated": script }))
    }

    async fn content(&self) -> Result<String> {
        Ok("<html><body>fake</body></html>".to_string())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        if self.has_selector(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout)
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if self.has_selector(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn type_text(&self, selector: &str, _text: &str) -> Result<()> {
        if self.has_selector(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn screenshot_page(&self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>> {
        if self.has_selector(selector) {
            Ok(vec![0x89, b'P', b'N', b'G'])
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.applied_headers.lock().unwrap().push(headers.clone());
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.cookie_jar.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn cookies(&self, _url: Option<&str>) -> Result<Vec<Cookie>> {
        Ok(self.cookie_jar.lock().unwrap().clone())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher double: hands out `FakeCapability` instances and keeps every one
/// reachable for assertions.
#[derive(Default)]
pub struct FakeLauncher {
    refuse_launch: AtomicBool,
    reject_init_scripts: AtomicBool,
    launched: Mutex<Vec<Arc<FakeCapability>>>,
    options_seen: Mutex<Vec<LaunchOptions>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_launch(&self, refuse: bool) {
        self.refuse_launch.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_init_scripts(&self, fail: bool) {
        self.reject_init_scripts.store(fail, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    /// Most recently launched capability. Panics if nothing launched yet.
    pub fn last_capability(&self) -> Arc<FakeCapability> {
        self.launched
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no capability launched")
    }

    pub fn last_options(&self) -> Option<LaunchOptions> {
        self.options_seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CapabilityLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserCapability>> {
        if self.refuse_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::Capability("fake launcher refused".to_string()));
        }
        let capability = Arc::new(FakeCapability::default());
        capability
            .reject_init_scripts
            .store(self.reject_init_scripts.load(Ordering::SeqCst), Ordering::SeqCst);
        self.launched.lock().unwrap().push(Arc::clone(&capability));
        self.options_seen.lock().unwrap().push(options.clone());
        Ok(Box::new(capability))
    }
}
