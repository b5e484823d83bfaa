//! Chrome DevTools Protocol binding
//!
//! Production implementation of the capability traits: one WebSocket
//! connection per session, one isolated browser context per capability.

pub mod protocol;

mod capability;
mod transport;

pub use capability::{CdpCapability, CdpLauncher};
pub use transport::{CdpConnection, CdpError};
