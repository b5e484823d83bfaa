//! CDP-backed capability
//!
//! One capability = one isolated browser context + one attached page target,
//! reached over the session's own DevTools connection. DOM interaction goes
//! through `Runtime.evaluate`; the engine stays a black box behind the
//! protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use serde_json::{json, Value};

use super::protocol::{
    LoadingFinished, RequestWillBeSent, ResponseReceived, SessionId, TargetId, WireResponse,
};
use super::transport::CdpConnection;
use crate::capability::{BrowserCapability, CapabilityLauncher, Cookie, LaunchOptions};
use crate::error::{BrowserError, Result};
use crate::interceptor::{NetworkInterceptor, RequestEvent, ResponseEvent};

const READY_POLL: Duration = Duration::from_millis(100);

/// Launches one `CdpCapability` per session against a shared DevTools
/// endpoint (a browser started with `--remote-debugging-port`).
pub struct CdpLauncher {
    endpoint: String,
}

impl CdpLauncher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CapabilityLauncher for CdpLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserCapability>> {
        let connection = CdpConnection::connect(&self.endpoint)
            .await
            .map_err(BrowserError::from)?;

        match build_capability(Arc::clone(&connection), options).await {
            Ok(capability) => Ok(Box::new(capability)),
            Err(err) => {
                if let Err(close_err) = connection.close().await {
                    tracing::warn!("connection cleanup after failed launch: {close_err}");
                }
                Err(err)
            }
        }
    }
}

async fn build_capability(
    connection: Arc<CdpConnection>,
    options: &LaunchOptions,
) -> Result<CdpCapability> {
    // Isolated context per session; disposeOnDetach covers crashed callers.
    let mut context_params = json!({ "disposeOnDetach": true });
    if let Some(proxy) = &options.proxy {
        context_params["proxyServer"] = json!(proxy);
    }
    let context = connection
        .send("Target.createBrowserContext", Some(context_params), None)
        .await
        .map_err(BrowserError::from)?;
    let context_id = required_str(&context, "browserContextId")?;

    let target = connection
        .send(
            "Target.createTarget",
            Some(json!({ "url": "about:blank", "browserContextId": context_id })),
            None,
        )
        .await
        .map_err(BrowserError::from)?;
    let target_id: TargetId = required_str(&target, "targetId")?;

    let attached = connection
        .send(
            "Target.attachToTarget",
            Some(json!({ "targetId": target_id, "flatten": true })),
            None,
        )
        .await
        .map_err(BrowserError::from)?;
    let session_id: SessionId = required_str(&attached, "sessionId")?;

    let capability = CdpCapability {
        connection,
        session_id,
        target_id,
        context_id,
        response_meta: Arc::new(DashMap::new()),
    };

    for domain in ["Page", "Runtime", "Network"] {
        capability.send(&format!("{domain}.enable"), None).await?;
    }

    capability
        .send(
            "Emulation.setDeviceMetricsOverride",
            Some(json!({
                "width": options.viewport.width,
                "height": options.viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            })),
        )
        .await?;

    if let Some(user_agent) = &options.user_agent {
        capability
            .send(
                "Network.setUserAgentOverride",
                Some(json!({ "userAgent": user_agent })),
            )
            .await?;
    }

    Ok(capability)
}

fn required_str(reply: &Value, key: &str) -> Result<String> {
    reply[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Capability(format!("devtools reply missing {key}")))
}

/// Quote arbitrary text as a JS string literal.
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn decode_body(reply: &Value) -> Option<Vec<u8>> {
    let body = reply["body"].as_str()?;
    if reply["base64Encoded"].as_bool().unwrap_or(false) {
        match BASE64.decode(body) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!("undecodable response body: {err}");
                None
            }
        }
    } else {
        Some(body.as_bytes().to_vec())
    }
}

pub struct CdpCapability {
    connection: Arc<CdpConnection>,
    session_id: SessionId,
    target_id: TargetId,
    context_id: String,

    /// Response metadata by request id, held between `responseReceived` and
    /// `loadingFinished` (only then is the body retrievable).
    response_meta: Arc<DashMap<String, WireResponse>>,
}

impl CdpCapability {
    async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.connection
            .send(method, params, Some(self.session_id.clone()))
            .await
            .map_err(BrowserError::from)
    }

    /// Run `action` against the first match of `selector`; `false` means the
    /// selector matched nothing.
    async fn hit_element(&self, selector: &str, action: &str) -> Result<bool> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; {action} return true; }})()",
            sel = js_string(selector),
        );
        Ok(self.evaluate(&expression).await?.as_bool().unwrap_or(false))
    }

    async fn capture(&self, clip: Option<Value>, beyond_viewport: bool) -> Result<Vec<u8>> {
        let mut params = json!({ "format": "png" });
        if let Some(clip) = clip {
            params["clip"] = clip;
        }
        if beyond_viewport {
            params["captureBeyondViewport"] = json!(true);
        }
        let reply = self.send("Page.captureScreenshot", Some(params)).await?;
        let data = required_str(&reply, "data")?;
        BASE64
            .decode(data)
            .map_err(|err| BrowserError::Capability(format!("undecodable screenshot payload: {err}")))
    }
}

#[async_trait]
impl BrowserCapability for CdpCapability {
    async fn add_init_script(&self, script: &str) -> Result<()> {
        self.send(
            "Page.addScriptToEvaluateOnNewDocument",
            Some(json!({ "source": script })),
        )
        .await?;
        Ok(())
    }

    fn observe_network(&self, interceptor: Arc<NetworkInterceptor>) {
        let session = self.session_id.clone();

        {
            let interceptor = Arc::clone(&interceptor);
            let session = session.clone();
            self.connection.subscribe(
                "Network.requestWillBeSent",
                Arc::new(move |event| {
                    if event.session_id.as_deref() != Some(session.as_str()) {
                        return;
                    }
                    let Some(params) = event.params else { return };
                    match serde_json::from_value::<RequestWillBeSent>(params) {
                        Ok(sent) => interceptor.record_request(RequestEvent {
                            url: sent.request.url,
                            method: sent.request.method,
                            headers: sent.request.headers,
                            body: sent.request.post_data,
                        }),
                        Err(err) => tracing::warn!("unreadable request event: {err}"),
                    }
                }),
            );
        }

        {
            let meta = Arc::clone(&self.response_meta);
            let session = session.clone();
            self.connection.subscribe(
                "Network.responseReceived",
                Arc::new(move |event| {
                    if event.session_id.as_deref() != Some(session.as_str()) {
                        return;
                    }
                    let Some(params) = event.params else { return };
                    match serde_json::from_value::<ResponseReceived>(params) {
                        Ok(received) => {
                            meta.insert(received.request_id, received.response);
                        }
                        Err(err) => tracing::warn!("unreadable response event: {err}"),
                    }
                }),
            );
        }

        {
            let meta = Arc::clone(&self.response_meta);
            let connection = Arc::clone(&self.connection);
            self.connection.subscribe(
                "Network.loadingFinished",
                Arc::new(move |event| {
                    if event.session_id.as_deref() != Some(session.as_str()) {
                        return;
                    }
                    let Some(params) = event.params else { return };
                    let finished: LoadingFinished = match serde_json::from_value(params) {
                        Ok(finished) => finished,
                        Err(err) => {
                            tracing::warn!("unreadable loading event: {err}");
                            return;
                        }
                    };
                    let Some((request_id, wire)) = meta.remove(&finished.request_id) else {
                        return;
                    };

                    // Body retrieval suspends; hand it off the reader task.
                    let interceptor = Arc::clone(&interceptor);
                    let connection = Arc::clone(&connection);
                    let session = session.clone();
                    tokio::spawn(async move {
                        let body = match connection
                            .send(
                                "Network.getResponseBody",
                                Some(json!({ "requestId": request_id })),
                                Some(session),
                            )
                            .await
                        {
                            Ok(reply) => decode_body(&reply),
                            Err(err) => {
                                tracing::warn!(url = %wire.url, "response body fetch failed: {err}");
                                None
                            }
                        };
                        interceptor.record_response(ResponseEvent {
                            url: wire.url,
                            status: wire.status,
                            headers: wire.headers,
                            body,
                        });
                    });
                }),
            );
        }
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<String> {
        let navigation = async {
            let reply = self.send("Page.navigate", Some(json!({ "url": url }))).await?;
            if let Some(error) = reply["errorText"].as_str() {
                if !error.is_empty() {
                    return Err(BrowserError::Capability(format!("navigation failed: {error}")));
                }
            }

            loop {
                let state = self.evaluate("document.readyState").await?;
                if state.as_str().map(|s| s != "loading").unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(READY_POLL).await;
            }

            let href = self.evaluate("location.href").await?;
            Ok(href.as_str().unwrap_or(url).to_string())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| BrowserError::Timeout)?
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let reply = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": script,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = reply.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("script exception");
            return Err(BrowserError::Capability(text.to_string()));
        }
        Ok(reply["result"]["value"].clone())
    }

    async fn content(&self) -> Result<String> {
        let html = self.evaluate("document.documentElement.outerHTML").await?;
        html.as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Capability("page content is not a string".to_string()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let probe = format!("document.querySelector({}) !== null", js_string(selector));
        let wait = async {
            loop {
                if self.evaluate(&probe).await?.as_bool().unwrap_or(false) {
                    return Ok(());
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BrowserError::Timeout)?
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let action = "el.scrollIntoView({block: 'center'}); el.click();";
        if self.hit_element(selector, action).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let action = format!(
            "el.focus(); el.value = {value}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}}));",
            value = js_string(text),
        );
        if self.hit_element(selector, &action).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn screenshot_page(&self, full_page: bool) -> Result<Vec<u8>> {
        if !full_page {
            return self.capture(None, false).await;
        }

        let metrics = self.send("Page.getLayoutMetrics", None).await?;
        let size = &metrics["cssContentSize"];
        let clip = json!({
            "x": 0,
            "y": 0,
            "width": size["width"].as_f64().unwrap_or(0.0),
            "height": size["height"].as_f64().unwrap_or(0.0),
            "scale": 1,
        });
        self.capture(Some(clip), true).await
    }

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return {{x: r.x, y: r.y, width: r.width, height: r.height}}; }})()",
            sel = js_string(selector),
        );
        let rect = self.evaluate(&expression).await?;
        if rect.is_null() {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }

        let clip = json!({
            "x": rect["x"].as_f64().unwrap_or(0.0),
            "y": rect["y"].as_f64().unwrap_or(0.0),
            "width": rect["width"].as_f64().unwrap_or(0.0),
            "height": rect["height"].as_f64().unwrap_or(0.0),
            "scale": 1,
        });
        self.capture(Some(clip), false).await
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.send(
            "Network.setExtraHTTPHeaders",
            Some(json!({ "headers": headers })),
        )
        .await?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.send("Network.setCookies", Some(json!({ "cookies": cookies })))
            .await?;
        Ok(())
    }

    async fn cookies(&self, url: Option<&str>) -> Result<Vec<Cookie>> {
        let params = url.map(|url| json!({ "urls": [url] }));
        let reply = self.send("Network.getCookies", params).await?;
        serde_json::from_value(reply["cookies"].clone())
            .map_err(|err| BrowserError::Capability(format!("unreadable cookie payload: {err}")))
    }

    /// Target, then context, then socket; every step attempted regardless of
    /// earlier failures.
    async fn close(&self) -> Result<()> {
        if let Err(err) = self
            .connection
            .send(
                "Target.closeTarget",
                Some(json!({ "targetId": self.target_id })),
                None,
            )
            .await
        {
            tracing::warn!(target_id = %self.target_id, "target close failed: {err}");
        }

        if let Err(err) = self
            .connection
            .send(
                "Target.disposeBrowserContext",
                Some(json!({ "browserContextId": self.context_id })),
                None,
            )
            .await
        {
            tracing::warn!("browser context disposal failed: {err}");
        }

        if let Err(err) = self.connection.close().await {
            tracing::warn!("devtools socket close failed: {err}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string("#main"), r##""#main""##);
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn decode_body_handles_both_encodings() {
        let plain = json!({ "body": "hello", "base64Encoded": false });
        assert_eq!(decode_body(&plain), Some(b"hello".to_vec()));

        let encoded = json!({ "body": "aGVsbG8=", "base64Encoded": true });
        assert_eq!(decode_body(&encoded), Some(b"hello".to_vec()));

        let broken = json!({ "body": "not-base64!!!", "base64Encoded": true });
        assert_eq!(decode_body(&broken), None);
    }
}
