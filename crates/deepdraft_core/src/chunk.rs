//! Streaming output.

use serde::{Deserialize, Serialize};

/// One increment of streamed model output.
///
/// `grounding` holds provider-supplied citation/source data exactly as the
/// provider sent it. The core never inspects it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Incremental text
    pub text: String,
    /// Opaque grounding metadata, usually only on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<serde_json::Value>,
}

impl StreamChunk {
    /// Text-only chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: None,
        }
    }

    /// Attach grounding metadata.
    pub fn with_grounding(mut self, grounding: serde_json::Value) -> Self {
        self.grounding = Some(grounding);
        self
    }
}
