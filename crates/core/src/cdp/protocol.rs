//! DevTools protocol types
//!
//! The fundamental wire shapes plus the Network-domain payloads the
//! interceptor feeds on. Keep them minimal - add domain types only when an
//! operation needs them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command id - monotonically increasing per connection.
pub type CommandId = u64;

/// Session id assigned by the browser for an attached target.
pub type SessionId = String;

/// Target id of a page.
pub type TargetId = String;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct CdpCommand {
    pub id: CommandId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Reply to a command.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: CommandId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpProtocolError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Spontaneous event (no command id).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Anything the browser can push over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// `Network.requestWillBeSent` payload (the slice of it we consume).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: String,
    pub request: WireRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub post_data: Option<String>,
}

/// `Network.responseReceived` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: String,
    pub response: WireResponse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// `Network.loadingFinished` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_and_events_discriminate() {
        let reply = r#"{"id": 7, "result": {"frameId": "F"}}"#;
        match serde_json::from_str::<CdpMessage>(reply).expect("parses") {
            CdpMessage::Response(response) => assert_eq!(response.id, 7),
            CdpMessage::Event(_) => panic!("reply parsed as event"),
        }

        let event = r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.0}, "sessionId": "S"}"#;
        match serde_json::from_str::<CdpMessage>(event).expect("parses") {
            CdpMessage::Event(event) => {
                assert_eq!(event.method, "Page.loadEventFired");
                assert_eq!(event.session_id.as_deref(), Some("S"));
            }
            CdpMessage::Response(_) => panic!("event parsed as reply"),
        }
    }

    #[test]
    fn protocol_errors_carry_code_and_message() {
        let reply = r#"{"id": 1, "error": {"code": -32000, "message": "no such frame"}}"#;
        let response: CdpResponse = serde_json::from_str(reply).expect("parses");
        let error = response.error.expect("error present");
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "no such frame");
    }

    #[test]
    fn request_will_be_sent_keeps_post_data() {
        let params = r#"{
            "requestId": "R1",
            "request": {
                "url": "https://a.test/api",
                "method": "POST",
                "headers": {"Content-Type": "application/json"},
                "postData": "{\"k\":1}"
            }
        }"#;
        let sent: RequestWillBeSent = serde_json::from_str(params).expect("parses");
        assert_eq!(sent.request.method, "POST");
        assert_eq!(sent.request.post_data.as_deref(), Some("{\"k\":1}"));
    }
}
