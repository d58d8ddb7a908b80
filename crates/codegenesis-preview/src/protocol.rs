//! Cross-frame message types.
//!
//! Host -> surface: `{ "type": "TOGGLE_VISUAL_EDIT", "enabled": bool }`
//!
//! Surface -> host: `{ "type": "ELEMENT_SELECTED", "payload": { "tagName", "text", "styles": { "color", "backgroundColor" } } }`
//!
//! Other scripts share the same window message channel, so decoding never
//! fails: anything unrecognized becomes [`Inbound::Ignored`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOGGLE_VISUAL_EDIT: &str = "TOGGLE_VISUAL_EDIT";
pub const ELEMENT_SELECTED: &str = "ELEMENT_SELECTED";

/// Maximum number of characters of element text carried in a selection.
pub const TEXT_PREVIEW_LIMIT: usize = 50;

/// Computed CSS properties reported with a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectionStyles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

/// An element picked in the preview. Created at click time, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEvent {
    pub tag_name: String,
    pub text: String,
    pub styles: SelectionStyles,
}

impl SelectionEvent {
    /// Build a selection, lower-casing the tag and truncating the text to
    /// [`TEXT_PREVIEW_LIMIT`] characters.
    pub fn new(tag_name: &str, text: &str, styles: SelectionStyles) -> Self {
        Self {
            tag_name: tag_name.to_lowercase(),
            text: truncate_chars(text, TEXT_PREVIEW_LIMIT),
            styles,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Commands the host sends into the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    ToggleVisualEdit { enabled: bool },
}

impl ControlCommand {
    const TAGS: &'static [&'static str] = &[TOGGLE_VISUAL_EDIT];

    pub fn encode(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Messages the surface sends to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurfaceMessage {
    ElementSelected { payload: SelectionEvent },
}

impl SurfaceMessage {
    const TAGS: &'static [&'static str] = &[ELEMENT_SELECTED];

    pub fn encode(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoredReason {
    NotAnObject,
    MissingType,
    UnknownType(String),
    Malformed(String),
}

/// Result of decoding one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<T> {
    Message(T),
    Ignored(IgnoredReason),
}

impl<T> Inbound<T> {
    pub fn into_message(self) -> Option<T> {
        match self {
            Inbound::Message(m) => Some(m),
            Inbound::Ignored(_) => None,
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value, known: &[&str]) -> Inbound<T> {
    let Some(obj) = value.as_object() else {
        return Inbound::Ignored(IgnoredReason::NotAnObject);
    };
    let Some(ty) = obj.get("type").and_then(Value::as_str) else {
        return Inbound::Ignored(IgnoredReason::MissingType);
    };
    if !known.contains(&ty) {
        return Inbound::Ignored(IgnoredReason::UnknownType(ty.to_string()));
    }
    match T::deserialize(value) {
        Ok(message) => Inbound::Message(message),
        Err(e) => Inbound::Ignored(IgnoredReason::Malformed(e.to_string())),
    }
}

/// Decode a message arriving at the surface.
pub fn decode_command(value: &Value) -> Inbound<ControlCommand> {
    decode(value, ControlCommand::TAGS)
}

/// Decode a message arriving at the host.
pub fn decode_surface_message(value: &Value) -> Inbound<SurfaceMessage> {
    decode(value, SurfaceMessage::TAGS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_toggle_wire_shape() {
        let cmd = ControlCommand::ToggleVisualEdit { enabled: true };
        assert_eq!(
            cmd.encode(),
            json!({"type": "TOGGLE_VISUAL_EDIT", "enabled": true})
        );
        assert_eq!(
            decode_command(&json!({"type": "TOGGLE_VISUAL_EDIT", "enabled": false})),
            Inbound::Message(ControlCommand::ToggleVisualEdit { enabled: false })
        );
    }

    #[test]
    fn test_element_selected_wire_shape() {
        let msg = SurfaceMessage::ElementSelected {
            payload: SelectionEvent::new(
                "BUTTON",
                "Click me",
                SelectionStyles {
                    color: Some("rgb(0, 0, 0)".into()),
                    background_color: Some("rgba(0, 0, 0, 0)".into()),
                },
            ),
        };
        assert_eq!(
            msg.encode(),
            json!({
                "type": "ELEMENT_SELECTED",
                "payload": {
                    "tagName": "button",
                    "text": "Click me",
                    "styles": {"color": "rgb(0, 0, 0)", "backgroundColor": "rgba(0, 0, 0, 0)"}
                }
            })
        );
    }

    #[test]
    fn test_text_truncates_on_char_boundary() {
        let long = "é".repeat(80);
        let ev = SelectionEvent::new("p", &long, SelectionStyles::default());
        assert_eq!(ev.text.chars().count(), TEXT_PREVIEW_LIMIT);
        assert!(long.starts_with(&ev.text));

        let short = SelectionEvent::new("p", "hi", SelectionStyles::default());
        assert_eq!(short.text, "hi");
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_ignored() {
        assert_eq!(
            decode_surface_message(&json!({"type": "UNKNOWN_EVENT", "payload": {}})),
            Inbound::Ignored(IgnoredReason::UnknownType("UNKNOWN_EVENT".into()))
        );
        assert_eq!(
            decode_command(&json!("TOGGLE_VISUAL_EDIT")),
            Inbound::Ignored(IgnoredReason::NotAnObject)
        );
        assert_eq!(
            decode_command(&json!({"enabled": true})),
            Inbound::Ignored(IgnoredReason::MissingType)
        );
        assert!(matches!(
            decode_command(&json!({"type": "TOGGLE_VISUAL_EDIT", "enabled": "yes"})),
            Inbound::Ignored(IgnoredReason::Malformed(_))
        ));
        // A command tag is not a surface message.
        assert!(matches!(
            decode_surface_message(&json!({"type": "TOGGLE_VISUAL_EDIT", "enabled": true})),
            Inbound::Ignored(IgnoredReason::UnknownType(_))
        ));
    }

    #[test]
    fn test_styles_object_is_required() {
        let without = json!({
            "type": "ELEMENT_SELECTED",
            "payload": {"tagName": "a", "text": "Home"}
        });
        assert!(matches!(
            decode_surface_message(&without),
            Inbound::Ignored(IgnoredReason::Malformed(_))
        ));

        // Individual style values may still be absent.
        let empty = json!({
            "type": "ELEMENT_SELECTED",
            "payload": {"tagName": "a", "text": "Home", "styles": {}}
        });
        match decode_surface_message(&empty) {
            Inbound::Message(SurfaceMessage::ElementSelected { payload }) => {
                assert_eq!(payload.styles, SelectionStyles::default())
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn test_styles_reject_extra_keys() {
        let msg = json!({
            "type": "ELEMENT_SELECTED",
            "payload": {"tagName": "a", "text": "", "styles": {"color": "red", "font": "x"}}
        });
        assert!(matches!(
            decode_surface_message(&msg),
            Inbound::Ignored(IgnoredReason::Malformed(_))
        ));
    }
}
