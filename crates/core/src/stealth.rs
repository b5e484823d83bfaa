//! Anti-detection init scripts
//!
//! Both scripts must be registered before the first navigation: detection
//! code runs at document-start, and a later injection cannot hide signals
//! that were already observable. Order is fixed - the navigator patch first,
//! the vendor bundle second.

use std::path::PathBuf;

/// Strips `navigator.webdriver` before any page script can read it.
pub const NAVIGATOR_PATCH: &str = r#"
Object.defineProperty(Navigator.prototype, 'webdriver', {
    get: () => undefined,
    configurable: true
});
delete Navigator.prototype.webdriver;
"#;

const DEFAULT_VENDOR_PATH: &str = "resources/stealth/stealth.min.js";

fn vendor_path() -> PathBuf {
    std::env::var("STEALTH_SCRIPT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_VENDOR_PATH))
}

/// Third-party stealth bundle, if present on disk. Missing file means the
/// session runs with the navigator patch only.
pub fn vendor_patch() -> Option<String> {
    let path = vendor_path();
    match std::fs::read_to_string(&path) {
        Ok(source) => Some(source),
        Err(err) => {
            tracing::warn!(path = %path.display(), "vendor stealth script unavailable: {err}");
            None
        }
    }
}
