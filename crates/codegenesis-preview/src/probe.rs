//! Probe running inside the sandboxed preview surface.
//!
//! The probe turns pointer and click events into [`SelectionEvent`]s while
//! visual-edit mode is active, and stays completely out of the page's way
//! while it is not. DOM access goes through [`Surface`]; the browser glue
//! registers the click listener on `window` in the capture phase and applies
//! the returned [`ClickDisposition`] (`preventDefault` +
//! `stopImmediatePropagation` on intercept).
//!
//! Nothing in here may fail the hosted page: geometry and style reads that
//! error out degrade to "no highlight" or missing style values.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{
    ControlCommand, Inbound, SelectionEvent, SelectionStyles, SurfaceMessage, decode_command,
};
use crate::selection::{ElementId, SelectionState, Transition};

/// Inline style for the highlight overlay: fixed, pointer-transparent,
/// top-most, initially hidden.
pub const OVERLAY_CSS: &str = "position:fixed;pointer-events:none;z-index:2147483647;\
border:2px solid #6366f1;background-color:rgba(99, 102, 241, 0.1);display:none;\
transition:all 0.1s ease;";

/// Client rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Inline style properties positioning the overlay over this rect.
    pub fn to_css(&self) -> String {
        format!(
            "top:{}px;left:{}px;width:{}px;height:{}px;display:block;",
            self.top, self.left, self.width, self.height
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayStyle {
    Hidden,
    Visible(Rect),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("element is no longer attached to the document")]
    Detached,
    #[error("cross-origin restriction")]
    CrossOrigin,
    #[error("surface unavailable: {0}")]
    Unavailable(String),
}

/// DOM operations the probe needs from its rendering surface.
pub trait Surface {
    /// True for the document root (`<html>`) and `<body>`.
    fn is_root(&self, element: ElementId) -> bool;

    fn bounding_rect(&self, element: ElementId) -> Result<Rect, SurfaceError>;

    fn tag_name(&self, element: ElementId) -> Result<String, SurfaceError>;

    fn inner_text(&self, element: ElementId) -> Result<String, SurfaceError>;

    /// Computed style property in CSS (kebab-case) form, e.g. `background-color`.
    fn computed_style(&self, element: ElementId, property: &str) -> Result<String, SurfaceError>;

    /// Append the overlay element to the document and return its handle.
    fn create_overlay(&mut self, css: &str) -> Result<ElementId, SurfaceError>;

    fn set_overlay(&mut self, overlay: ElementId, style: OverlayStyle) -> Result<(), SurfaceError>;
}

/// Why a pointer-move did not move the highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverIgnoredReason {
    Inactive,
    Overlay,
    Root,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoverOutcome {
    Highlighted(Rect),
    /// Target recorded but its geometry could not be read; overlay hidden.
    Degraded(SurfaceError),
    Ignored(HoverIgnoredReason),
}

/// What the capture-phase click listener must do with the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDisposition {
    /// Leave the event alone: no `preventDefault`, no propagation stop.
    PassThrough,
    /// Suppress the default action and stop immediate propagation; post the selection
    /// to the parent frame when one could be read.
    Intercept { selection: Option<SelectionEvent> },
}

impl ClickDisposition {
    pub fn suppresses_default(&self) -> bool {
        matches!(self, ClickDisposition::Intercept { .. })
    }

    pub fn selection(&self) -> Option<&SelectionEvent> {
        match self {
            ClickDisposition::Intercept { selection } => selection.as_ref(),
            ClickDisposition::PassThrough => None,
        }
    }

    /// The `ELEMENT_SELECTED` message to post to the parent frame.
    pub fn outbound(&self) -> Option<Value> {
        self.selection().map(|payload| {
            SurfaceMessage::ElementSelected {
                payload: payload.clone(),
            }
            .encode()
        })
    }
}

/// Probe state for one frame. Created on attach, dropped on detach.
pub struct Probe<S: Surface> {
    surface: S,
    state: SelectionState,
    overlay: Option<ElementId>,
    highlight: Option<Rect>,
}

impl<S: Surface> Probe<S> {
    /// Attach to a freshly loaded frame. Starts inactive with no overlay.
    pub fn attach(surface: S) -> Self {
        Self {
            surface,
            state: SelectionState::new(),
            overlay: None,
            highlight: None,
        }
    }

    /// Frame teardown: release the surface. The overlay node goes with the
    /// document.
    pub fn detach(self) -> S {
        debug!(active = self.state.is_active(), "Probe detached");
        self.surface
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn overlay(&self) -> Option<ElementId> {
        self.overlay
    }

    /// Rectangle the overlay currently covers, if visible.
    pub fn highlight(&self) -> Option<Rect> {
        self.highlight
    }

    /// Handle a raw inbound window message. Returns true if it was a command.
    pub fn handle_message(&mut self, message: &Value) -> bool {
        match decode_command(message) {
            Inbound::Message(ControlCommand::ToggleVisualEdit { enabled }) => {
                self.toggle(enabled);
                true
            }
            Inbound::Ignored(reason) => {
                debug!(?reason, "Probe ignored message");
                false
            }
        }
    }

    pub fn toggle(&mut self, enabled: bool) {
        let transition = self
            .state
            .apply(ControlCommand::ToggleVisualEdit { enabled });
        if enabled {
            self.ensure_overlay();
        } else if transition == Transition::Deactivated {
            self.hide_overlay();
        }
        debug!(enabled, ?transition, "Visual edit toggled");
    }

    fn ensure_overlay(&mut self) {
        if self.overlay.is_some() {
            return;
        }
        match self.surface.create_overlay(OVERLAY_CSS) {
            Ok(id) => self.overlay = Some(id),
            Err(e) => warn!(error = %e, "Could not create highlight overlay"),
        }
    }

    fn hide_overlay(&mut self) {
        self.highlight = None;
        if let Some(overlay) = self.overlay {
            if let Err(e) = self.surface.set_overlay(overlay, OverlayStyle::Hidden) {
                debug!(error = %e, "Could not hide overlay");
            }
        }
    }

    /// Pointer moved over `target`. Geometry is read fresh on every move.
    pub fn pointer_move(&mut self, target: ElementId) -> HoverOutcome {
        if !self.state.is_active() {
            return HoverOutcome::Ignored(HoverIgnoredReason::Inactive);
        }
        if Some(target) == self.overlay {
            return HoverOutcome::Ignored(HoverIgnoredReason::Overlay);
        }
        if self.surface.is_root(target) {
            return HoverOutcome::Ignored(HoverIgnoredReason::Root);
        }

        self.state.hover(target);
        self.ensure_overlay();

        match self.surface.bounding_rect(target) {
            Ok(rect) => {
                if let Some(overlay) = self.overlay {
                    match self.surface.set_overlay(overlay, OverlayStyle::Visible(rect)) {
                        Ok(()) => self.highlight = Some(rect),
                        Err(e) => {
                            debug!(error = %e, "Could not move overlay");
                            self.highlight = None;
                        }
                    }
                }
                HoverOutcome::Highlighted(rect)
            }
            Err(e) => {
                debug!(element = target.0, error = %e, "Hover target geometry unavailable");
                self.hide_overlay();
                HoverOutcome::Degraded(e)
            }
        }
    }

    /// A node was removed from the document.
    pub fn node_removed(&mut self, element: ElementId) {
        if self.state.forget(element) {
            self.hide_overlay();
        }
        if self.overlay == Some(element) {
            self.overlay = None;
            self.highlight = None;
        }
    }

    /// Capture-phase click. Only intercepts while active with a hovered element.
    pub fn click(&mut self) -> ClickDisposition {
        let Some(target) = self.state.click_target() else {
            return ClickDisposition::PassThrough;
        };
        let selection = self.read_selection(target);
        if selection.is_none() {
            warn!(element = target.0, "Click intercepted but element could not be read");
        }
        ClickDisposition::Intercept { selection }
    }

    fn read_selection(&self, target: ElementId) -> Option<SelectionEvent> {
        let tag = self
            .surface
            .tag_name(target)
            .ok()
            .filter(|t| !t.trim().is_empty())?;
        let text = self.surface.inner_text(target).unwrap_or_default();
        let styles = SelectionStyles {
            color: self.surface.computed_style(target, "color").ok(),
            background_color: self.surface.computed_style(target, "background-color").ok(),
        };
        Some(SelectionEvent::new(&tag, &text, styles))
    }
}
