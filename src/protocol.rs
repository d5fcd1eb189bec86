use crate::error::{Result, WebOsError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const URI_LIST_APPS: &str = "ssap://com.webos.applicationManager/listApps";
pub const URI_FOREGROUND_APP: &str = "ssap://com.webos.applicationManager/getForegroundAppInfo";
pub const URI_PROGRAM_INFO: &str = "ssap://tv/getChannelProgramInfo";
pub const URI_SW_INFO: &str = "ssap://com.webos.service.update/getCurrentSWInformation";
pub const URI_TURN_OFF: &str = "ssap://system/turnOff";
pub const URI_SET_MUTE: &str = "ssap://audio/setMute";
pub const URI_OPEN_CHANNEL: &str = "ssap://tv/openChannel";

/// App id of the live broadcast viewer
pub const LIVE_TV_APP_ID: &str = "com.webos.app.livetv";

const PERMISSIONS: &[&str] = &[
    "LAUNCH",
    "CONTROL_AUDIO",
    "CONTROL_POWER",
    "CONTROL_INPUT_TV",
    "READ_INSTALLED_APPS",
    "READ_RUNNING_APPS",
    "READ_CURRENT_CHANNEL",
    "READ_TV_CHANNEL_LIST",
    "READ_NETWORK_STATE",
    "READ_UPDATE_INFO",
];

/// Outgoing message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Incoming message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Message types on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Register,
    Registered,
    Request,
    Response,
    Subscribe,
    Error,
    #[serde(other)]
    Unknown,
}

/// One step of the registration exchange as seen from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// The device shows an accept/decline prompt
    Prompted,
    /// Registration done; carries the client key to reuse
    Registered { client_key: String },
    /// The device declined the registration
    Rejected(String),
}

impl Request {
    /// Create a request for the given `ssap://` uri
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: MessageType::Request,
            uri: Some(uri.into()),
            payload: None,
        }
    }

    /// Create a registration message, resuming with `client_key` if given
    pub fn register(client_key: Option<&str>) -> Self {
        let mut payload = json!({
            "forcePairing": false,
            "pairingType": "PROMPT",
            "manifest": {
                "manifestVersion": 1,
                "appVersion": "1.1",
                "permissions": PERMISSIONS,
            },
        });
        if let (Some(key), Some(obj)) = (client_key, payload.as_object_mut()) {
            obj.insert("client-key".to_string(), Value::String(key.to_string()));
        }

        Self {
            id: format!("register_{}", Uuid::new_v4()),
            kind: MessageType::Register,
            uri: None,
            payload: Some(payload),
        }
    }

    /// Set the request payload
    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }
}

impl Response {
    /// Reduce a reply to its payload, turning error replies and
    /// `returnValue: false` into API errors
    pub fn into_payload(self) -> Result<Value> {
        if self.kind == MessageType::Error {
            return Err(WebOsError::ApiError {
                detail: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let payload = self.payload.unwrap_or(Value::Null);
        if payload.get("returnValue").and_then(|v| v.as_bool()) == Some(false) {
            let detail = payload
                .get("errorText")
                .and_then(|v| v.as_str())
                .unwrap_or("request failed")
                .to_string();
            return Err(WebOsError::ApiError { detail });
        }

        Ok(payload)
    }

    /// Classify a reply to a registration message
    pub fn handshake_event(&self) -> Result<HandshakeEvent> {
        match self.kind {
            MessageType::Registered => self
                .payload
                .as_ref()
                .and_then(|p| p.get("client-key"))
                .and_then(|v| v.as_str())
                .map(|key| HandshakeEvent::Registered {
                    client_key: key.to_string(),
                })
                .ok_or_else(|| {
                    WebOsError::InvalidResponse("registered reply without client-key".to_string())
                }),
            MessageType::Error => Ok(HandshakeEvent::Rejected(
                self.error.clone().unwrap_or_else(|| "registration rejected".to_string()),
            )),
            MessageType::Response
                if self
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("pairingType"))
                    .and_then(|v| v.as_str())
                    == Some("PROMPT") =>
            {
                Ok(HandshakeEvent::Prompted)
            }
            _ => Err(WebOsError::InvalidResponse(format!(
                "unexpected registration reply: {:?}",
                self.kind
            ))),
        }
    }
}
