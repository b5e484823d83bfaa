//! Network interceptor - per-session request/response capture
//!
//! Design:
//! 1. Purely in-memory, insertion-ordered store; no I/O
//! 2. Responses correlate to the first unmatched request with the same URL
//!    (FIFO per URL - imprecise when concurrent requests share a URL, kept
//!    for compatibility with the wire contract)
//! 3. Body decode failures are swallowed and logged; interception never
//!    aborts a session operation

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

/// Outbound request observed on the wire.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Inbound response observed on the wire. `body` is the raw payload; decoding
/// to text happens at record time.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterceptedRequest {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timestamp: f64,
    pub response: Option<InterceptedResponse>,
}

#[derive(Default)]
struct InterceptorState {
    requests: Vec<InterceptedRequest>,
    filter: Option<Regex>,
}

/// Records and correlates one session's network traffic.
///
/// Shared between the session and the capability's event callbacks, so all
/// state sits behind one short-held mutex.
#[derive(Default)]
pub struct NetworkInterceptor {
    state: Mutex<InterceptorState>,
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Methods that carry a request body worth retaining.
fn carries_body(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

impl NetworkInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a URL filter. Traffic not matching the pattern is ignored from
    /// this point on; already-recorded entries are untouched.
    pub fn set_filter(&self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)?;
        self.lock_state().filter = Some(regex);
        Ok(())
    }

    /// Drop every stored record unconditionally. The filter stays in place.
    pub fn clear(&self) {
        self.lock_state().requests.clear();
    }

    pub fn record_request(&self, event: RequestEvent) {
        let mut state = self.lock_state();
        if let Some(filter) = &state.filter {
            if !filter.is_match(&event.url) {
                return;
            }
        }

        let body = if carries_body(&event.method) {
            event.body
        } else {
            None
        };

        state.requests.push(InterceptedRequest {
            request_id: Uuid::new_v4().to_string(),
            url: event.url,
            method: event.method,
            headers: event.headers,
            body,
            timestamp: unix_now(),
            response: None,
        });
    }

    pub fn record_response(&self, event: ResponseEvent) {
        let mut state = self.lock_state();
        if let Some(filter) = &state.filter {
            if !filter.is_match(&event.url) {
                return;
            }
        }

        // First unmatched request with the same URL wins.
        let Some(entry) = state
            .requests
            .iter_mut()
            .find(|req| req.url == event.url && req.response.is_none())
        else {
            return;
        };

        let body = match event.body {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(err) => {
                    tracing::warn!(url = %event.url, "response body is not text: {err}");
                    None
                }
            },
            None => None,
        };

        entry.response = Some(InterceptedResponse {
            status: event.status,
            headers: event.headers,
            body,
        });
    }

    /// Snapshot of records whose response slot is filled, in insertion order.
    /// In-flight requests stay invisible until their response arrives.
    pub fn completed_requests(&self) -> Vec<InterceptedRequest> {
        self.lock_state()
            .requests
            .iter()
            .filter(|req| req.response.is_some())
            .cloned()
            .collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, InterceptorState> {
        // Callbacks never panic while holding the lock; recover anyway so a
        // poisoned mutex cannot take the whole session down.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
