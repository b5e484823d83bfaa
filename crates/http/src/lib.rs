//! REST adapter for the browser session pool
//!
//! Thin transport layer: every route translates one wire message into one
//! pool/session call and maps the core error taxonomy onto HTTP statuses.
//! No automation logic lives in this crate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::ServerConfig;
pub use routes::router;
