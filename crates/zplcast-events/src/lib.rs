//! Wire types pushed to viewers over the zplcast broadcast channel.
//!
//! Every frame is a JSON object tagged by `event`:
//!
//! ```json
//! {"event":"rendered","images":["iVBORw0KGgo..."]}
//! {"event":"error","message":"rendering service returned 400 Bad Request","detail":"ERROR: ..."}
//! ```

use serde::{Deserialize, Serialize};

/// Event delivered to every connected viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewerEvent {
    /// A document rendered successfully; one base64-encoded PNG per label, in page order.
    Rendered { images: Vec<String> },
    /// Rendering failed. `detail` carries the raw upstream diagnostic, or is empty.
    Error { message: String, detail: String },
}

impl ViewerEvent {
    /// Stable name of the event kind, as it appears in the `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ViewerEvent::Rendered { .. } => "rendered",
            ViewerEvent::Error { .. } => "error",
        }
    }

    /// Serialize to the JSON text carried by a single WebSocket frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
