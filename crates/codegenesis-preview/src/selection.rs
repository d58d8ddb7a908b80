//! Selection state machine.
//!
//! ```text
//! Inactive --toggle(true)--> Active{None} --hover(e)--> Active{Some(e)}
//!    ^                          |                          |
//!    +-------toggle(false)------+-----------toggle(false)--+
//! ```
//!
//! A click in `Active{Some(e)}` emits a selection without changing state.

use crate::protocol::ControlCommand;

/// Lookup handle for a node in the surface's document tree.
///
/// The document owns the node; the probe only keeps this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Inactive,
    Active { hovered: Option<ElementId> },
}

/// Observable effect of one state-machine input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Activated,
    Deactivated,
    Hovered(ElementId),
}

impl SelectionState {
    pub const fn new() -> Self {
        SelectionState::Inactive
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, SelectionState::Active { .. })
    }

    pub const fn hovered(&self) -> Option<ElementId> {
        match self {
            SelectionState::Active { hovered } => *hovered,
            SelectionState::Inactive => None,
        }
    }

    pub fn apply(&mut self, command: ControlCommand) -> Transition {
        match command {
            ControlCommand::ToggleVisualEdit { enabled: true } => {
                if self.is_active() {
                    Transition::Unchanged
                } else {
                    *self = SelectionState::Active { hovered: None };
                    Transition::Activated
                }
            }
            ControlCommand::ToggleVisualEdit { enabled: false } => {
                if self.is_active() {
                    *self = SelectionState::Inactive;
                    Transition::Deactivated
                } else {
                    Transition::Unchanged
                }
            }
        }
    }

    /// Pointer moved over a valid (non-overlay, non-root) element.
    pub fn hover(&mut self, element: ElementId) -> Transition {
        match self {
            SelectionState::Active { hovered } => {
                *hovered = Some(element);
                Transition::Hovered(element)
            }
            SelectionState::Inactive => Transition::Unchanged,
        }
    }

    /// The element was removed from the document; drop the handle if held.
    pub fn forget(&mut self, element: ElementId) -> bool {
        match self {
            SelectionState::Active { hovered } if *hovered == Some(element) => {
                *hovered = None;
                true
            }
            _ => false,
        }
    }

    /// Element a click would select right now, if any.
    pub const fn click_target(&self) -> Option<ElementId> {
        self.hovered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ON: ControlCommand = ControlCommand::ToggleVisualEdit { enabled: true };
    const OFF: ControlCommand = ControlCommand::ToggleVisualEdit { enabled: false };

    #[test]
    fn test_initial_state_is_inactive() {
        let state = SelectionState::new();
        assert!(!state.is_active());
        assert_eq!(state.click_target(), None);
    }

    #[test]
    fn test_full_cycle() {
        let mut state = SelectionState::new();
        assert_eq!(state.apply(ON), Transition::Activated);
        assert_eq!(state, SelectionState::Active { hovered: None });

        assert_eq!(state.hover(ElementId(7)), Transition::Hovered(ElementId(7)));
        assert_eq!(state.click_target(), Some(ElementId(7)));

        assert_eq!(state.apply(OFF), Transition::Deactivated);
        assert_eq!(state, SelectionState::Inactive);
        assert_eq!(state.hovered(), None);
    }

    #[test]
    fn test_hover_while_inactive_is_ignored() {
        let mut state = SelectionState::new();
        assert_eq!(state.hover(ElementId(1)), Transition::Unchanged);
        assert_eq!(state, SelectionState::Inactive);
    }

    #[test]
    fn test_redundant_toggles_settle_on_last() {
        let sequences: [&[ControlCommand]; 4] = [
            &[ON, ON, ON],
            &[ON, OFF, OFF, ON],
            &[OFF, ON, OFF],
            &[ON, ON, OFF, OFF, OFF],
        ];
        for seq in sequences {
            let mut state = SelectionState::new();
            for cmd in seq {
                state.apply(*cmd);
            }
            let ControlCommand::ToggleVisualEdit { enabled } = seq[seq.len() - 1];
            assert_eq!(state.is_active(), enabled, "sequence {seq:?}");
        }
    }

    #[test]
    fn test_reactivation_keeps_hover() {
        let mut state = SelectionState::new();
        state.apply(ON);
        state.hover(ElementId(3));
        assert_eq!(state.apply(ON), Transition::Unchanged);
        assert_eq!(state.hovered(), Some(ElementId(3)));
    }

    #[test]
    fn test_forget_clears_matching_hover_only() {
        let mut state = SelectionState::new();
        state.apply(ON);
        state.hover(ElementId(3));
        assert!(!state.forget(ElementId(4)));
        assert!(state.forget(ElementId(3)));
        assert_eq!(state, SelectionState::Active { hovered: None });
    }
}
