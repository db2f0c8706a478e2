//! Streaming wire protocol.
//!
//! Text frames carry JSON objects shaped `{"type": ..., "value": ...}`.
//! Binary frames carry raw little-endian f32 mono PCM.

use crate::registry::Outgoing;
use serde::{Deserialize, Serialize};

/// One processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvPacket {
    /// Base64 PNG of the frame image with region outlines and predicted notes
    pub sai: String,
    /// Base64 PNG of the tiled per-region encoder activations
    pub activations: String,
    /// Base64 PNG of the voting-stage input code, `null` without a voting stage
    #[serde(default)]
    pub voting: Option<String>,
    /// Frame time in seconds
    pub ts: f64,
    /// Predicted pitches
    #[serde(default)]
    pub notes: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoState {
    Paused,
    Ended,
    Continue,
}

/// Server → client messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ServerMessage {
    Avpacket(AvPacket),
    /// Percentage complete, `0..=100`
    Progress(f32),
    DemoState(DemoState),
}

/// Client → server messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClientMessage {
    DemoState(DemoState),
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&ServerMessage> for Outgoing {
    fn from(message: &ServerMessage) -> Self {
        match message.to_json() {
            Ok(text) => Outgoing::Text(text),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize server message");
                Outgoing::Text(String::from("{}"))
            }
        }
    }
}

impl From<ServerMessage> for Outgoing {
    fn from(message: ServerMessage) -> Self {
        Outgoing::from(&message)
    }
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Raw little-endian f32 PCM bytes.
pub fn pcm_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
