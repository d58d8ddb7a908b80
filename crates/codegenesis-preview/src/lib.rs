//! Preview sandbox communication: the visual-edit protocol between the
//! dashboard and the iframe that renders AI-generated code.
//!
//! The sandboxed surface runs the [`probe`]; the parent page runs the
//! [`bridge`]. They only ever exchange the two message shapes in
//! [`protocol`]. Both sides are host-driven: browser glue feeds DOM events in
//! and applies the returned directives, so every decision here is
//! deterministic and testable without a browser.

pub mod bridge;
pub mod document;
pub mod markdown;
pub mod probe;
pub mod protocol;
pub mod script;
pub mod selection;

pub use bridge::{BridgeStats, ChannelError, FrameChannel, FrameId, HostBridge, edit_prompt};
pub use document::{PreviewDocument, PreviewFile, PreviewOptions, assemble};
pub use probe::{ClickDisposition, HoverOutcome, OverlayStyle, Probe, Rect, Surface, SurfaceError};
pub use protocol::{
    ControlCommand, Inbound, SelectionEvent, SelectionStyles, SurfaceMessage, decode_command,
    decode_surface_message,
};
pub use selection::{ElementId, SelectionState};
