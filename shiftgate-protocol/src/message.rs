//! JSON envelopes carried in the text segment.

use crate::error::ProtocolError;
use crate::frame::Packet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol name used when a request could not be attributed to one.
pub const UNKNOWN_PROTOCOL: &str = "unknown";

/// Request envelope: `{"protocol": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Handler name.
    pub protocol: String,

    /// Protocol-specific parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parses a request from a packet's text segment.
    ///
    /// Invalid JSON yields [`ProtocolError::Json`]; a document without a
    /// string `protocol` field yields [`ProtocolError::MissingField`].
    pub fn from_text(text: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(text)?;
        let Value::Object(mut root) = value else {
            return Err(ProtocolError::MissingField("protocol"));
        };
        let protocol = match root.remove("protocol") {
            Some(Value::String(name)) => name,
            _ => return Err(ProtocolError::MissingField("protocol")),
        };
        Ok(Self {
            protocol,
            data: root.remove("data"),
        })
    }

    /// Returns `data` if it is a JSON object.
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref().and_then(Value::as_object)
    }

    /// Encodes the request as a text-only packet.
    pub fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Packet::from_json(self)
    }
}

/// Outcome marker of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespStatus {
    Success,
    Fail,
}

/// Response envelope:
/// `{"protocol": "<name>", "resp": "success"|"fail", "message": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Echo of the request protocol, or a response-specific name.
    pub protocol: String,

    /// Outcome.
    pub resp: RespStatus,

    /// Human-readable outcome message.
    #[serde(default)]
    pub message: String,

    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(protocol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            resp: RespStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn fail(protocol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            resp: RespStatus::Fail,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.resp == RespStatus::Success
    }

    /// Encodes the response as a text-only packet.
    pub fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Packet::from_json(self)
    }
}
