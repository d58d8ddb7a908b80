//! Host side of the preview channel.
//!
//! The dashboard owns one [`HostBridge`] per preview frame. Commands are
//! posted to that frame only; inbound window messages are filtered by source
//! frame and tag, then validated before anything reaches the editing UI.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{
    ControlCommand, IgnoredReason, Inbound, SelectionEvent, SurfaceMessage, TEXT_PREVIEW_LIMIT,
    decode_surface_message,
};

/// Identifies one embedded frame within the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("frame {0:?} is not attached")]
    Detached(FrameId),
    #[error("post failed: {0}")]
    Post(String),
}

/// Cross-frame transport. Implementations deliver to exactly the given frame.
pub trait FrameChannel {
    fn post(&self, frame: FrameId, message: Value) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub forwarded: u64,
    pub dropped_foreign: u64,
    pub dropped_unknown: u64,
    pub dropped_malformed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionRejected {
    #[error("tag name is empty")]
    EmptyTag,
    #[error("text exceeds the preview limit ({0} characters)")]
    TextTooLong(usize),
}

pub struct HostBridge<C: FrameChannel> {
    channel: C,
    frame: FrameId,
    visual_edit: bool,
    stats: BridgeStats,
}

impl<C: FrameChannel> HostBridge<C> {
    pub fn new(channel: C, frame: FrameId) -> Self {
        Self {
            channel,
            frame,
            visual_edit: false,
            stats: BridgeStats::default(),
        }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Last mode successfully delivered to the frame.
    pub fn visual_edit(&self) -> bool {
        self.visual_edit
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send the visual-edit mode to the bound frame.
    pub fn set_visual_edit_mode(&mut self, enabled: bool) -> Result<(), ChannelError> {
        let message = ControlCommand::ToggleVisualEdit { enabled }.encode();
        self.channel.post(self.frame, message)?;
        self.visual_edit = enabled;
        debug!(frame = self.frame.0, enabled, "Visual edit mode sent");
        Ok(())
    }

    /// Re-send the current mode, e.g. after the frame reloaded with new code.
    pub fn resync(&mut self) -> Result<(), ChannelError> {
        self.set_visual_edit_mode(self.visual_edit)
    }

    /// Handle a window message. Returns the selection when it is a valid
    /// `ELEMENT_SELECTED` from the bound frame.
    pub fn receive(&mut self, source: FrameId, message: &Value) -> Option<SelectionEvent> {
        if source != self.frame {
            self.stats.dropped_foreign += 1;
            debug!(source = source.0, frame = self.frame.0, "Dropped message from foreign frame");
            return None;
        }

        let event = match decode_surface_message(message) {
            Inbound::Message(SurfaceMessage::ElementSelected { payload }) => payload,
            Inbound::Ignored(IgnoredReason::Malformed(reason)) => {
                self.stats.dropped_malformed += 1;
                warn!(%reason, "Discarded malformed selection");
                return None;
            }
            Inbound::Ignored(reason) => {
                self.stats.dropped_unknown += 1;
                debug!(?reason, "Ignored window message");
                return None;
            }
        };

        if let Err(e) = validate_selection(&event) {
            self.stats.dropped_malformed += 1;
            warn!(error = %e, "Discarded invalid selection");
            return None;
        }

        self.stats.forwarded += 1;
        debug!(tag = %event.tag_name, "Element selected in preview");
        Some(event)
    }
}

/// Check the payload invariants the probe is supposed to guarantee.
pub fn validate_selection(event: &SelectionEvent) -> Result<(), SelectionRejected> {
    if event.tag_name.trim().is_empty() {
        return Err(SelectionRejected::EmptyTag);
    }
    let len = event.text.chars().count();
    if len > TEXT_PREVIEW_LIMIT {
        return Err(SelectionRejected::TextTooLong(len));
    }
    Ok(())
}

/// Prefill for the editing prompt describing the selected element.
pub fn edit_prompt(event: &SelectionEvent) -> String {
    let text = event.text.trim();
    if text.is_empty() {
        format!("the `<{}>` element", event.tag_name)
    } else {
        format!("the `<{}>` saying '{}'", event.tag_name, text)
    }
}
