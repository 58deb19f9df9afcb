use crate::files::{FileStatus, StructureNode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod pusher;

pub const CHAT_RESPONSE: &str = "chat-response";
pub const CODE_CHUNK: &str = "code-chunk";
pub const FILE_STATUS: &str = "file-generation-status";
pub const INITIAL_STRUCTURE: &str = "initial-structure";
pub const ERROR: &str = "error";

/// Identity of one push subscription, also sent to the backend so it knows
/// where to publish.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ChannelState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Channel error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("undecodable `{event}` payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("websocket: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message_start: bool,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub run_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeChunk {
    #[serde(rename = "filePath", default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileStatusUpdate {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitialStructure {
    #[serde(default)]
    pub structure: Vec<StructureNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    ChatResponse(ChatResponse),
    CodeChunk(CodeChunk),
    FileStatus(FileStatusUpdate),
    InitialStructure(InitialStructure),
    Error(ServerError),
}

impl PushEvent {
    /// Decodes a named channel event. Events this client does not consume
    /// yield `Ok(None)`. Payloads may arrive JSON-encoded inside a string.
    pub fn decode(event: &str, data: &Value) -> Result<Option<Self>, ChannelError> {
        let decoded = match event {
            CHAT_RESPONSE => Self::ChatResponse(payload(event, data)?),
            CODE_CHUNK => Self::CodeChunk(payload(event, data)?),
            FILE_STATUS => Self::FileStatus(payload(event, data)?),
            INITIAL_STRUCTURE => Self::InitialStructure(payload(event, data)?),
            ERROR => Self::Error(payload(event, data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatResponse(_) => CHAT_RESPONSE,
            Self::CodeChunk(_) => CODE_CHUNK,
            Self::FileStatus(_) => FILE_STATUS,
            Self::InitialStructure(_) => INITIAL_STRUCTURE,
            Self::Error(_) => ERROR,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: &Value) -> Result<T, ChannelError> {
    let result = match data {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => T::deserialize(other),
    };
    result.map_err(|source| ChannelError::Payload {
        event: event.to_string(),
        source,
    })
}
