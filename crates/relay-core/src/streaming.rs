//! Streaming response types.
//!
//! A stream is a lazy, finite, non-restartable sequence of [`ResponseChunk`]
//! terminated by exactly one chunk with the final flag set.

use crate::error::RelayError;
use crate::response::Usage;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Boxed chunk stream returned by transports and the orchestrator
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk, RelayError>>;

/// One increment of streamed output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    /// Partial text produced since the previous chunk
    pub delta: String,

    /// Set on the terminating chunk only
    #[serde(rename = "final")]
    pub is_final: bool,

    /// Aggregated usage, populated only on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ResponseChunk {
    /// Create a content chunk
    #[must_use]
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            delta: content.into(),
            is_final: false,
            usage: None,
        }
    }

    /// Create the terminating chunk carrying aggregated usage
    #[must_use]
    pub fn final_with_usage(usage: Usage) -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            usage: Some(usage),
        }
    }

    /// Create the terminating chunk with no usage
    #[must_use]
    pub fn final_empty() -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            usage: None,
        }
    }
}
