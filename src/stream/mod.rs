//! Server-sent event streaming for incremental chat replies.
//!
//! - [`sse`]: byte-level line splitting and `data:` record extraction.
//! - [`events`]: the JSON payload of each record.
//! - [`reader`]: the HTTP reader that drives caller callbacks.

pub mod events;
pub mod reader;
pub mod sse;

pub use events::{StreamEvent, StreamEventKind, Usage};
pub use reader::{EventStreamReader, StreamCallbacks, StreamHandle, read_events};
pub use sse::SseLineDecoder;
