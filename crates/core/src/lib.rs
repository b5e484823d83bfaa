//! Browser session pool and network interception
//!
//! This crate manages a bounded pool of isolated headless-browser sessions
//! and correlates each session's network traffic into structured records.
//!
//! # Architecture
//!
//! 1. **Capability seam**: the engine is reached only through the
//!    [`capability::BrowserCapability`] trait, so pool bounds, expiry,
//!    header accumulation and correlation are testable without a browser
//! 2. **Single-writer sessions**: one capability per session, never shared;
//!    the pool's map is the only cross-session mutable state
//! 3. **Fail where it matters**: capability failures propagate unchanged in
//!    kind; only interception body decoding is allowed to degrade silently

pub mod capability;
pub mod cdp;
pub mod error;
pub mod interceptor;
pub mod pool;
pub mod session;
pub mod stealth;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use capability::{BrowserCapability, CapabilityLauncher, Cookie, LaunchOptions, Viewport};
pub use cdp::CdpLauncher;
pub use error::{BrowserError, Result};
pub use interceptor::{InterceptedRequest, InterceptedResponse, NetworkInterceptor};
pub use pool::{BrowserPool, PoolConfig};
pub use session::{BrowserSession, SessionOptions};
