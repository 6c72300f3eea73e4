//! Chat collaborator reply normalization.
//!
//! The chat service answers with a JSON body whose `answer` field is either
//! the `{chat, act}` object itself or that object encoded once more as a JSON
//! string, depending on how the app is configured upstream. [`ChatReply::from_body`]
//! unwraps both shapes and falls back to the raw text when the inner decode
//! fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ChatError, Result};

/// Opaque instruction for the robot-control collaborator.
///
/// Only its presence and truthiness are interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionDirective(Value);

impl ActionDirective {
    /// Wrap a raw JSON value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The directive as text, when it is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// JavaScript-style truthiness: `null`, `false`, `0` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match &self.0 {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl std::fmt::Display for ActionDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Normalized `{chat, act}` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Text to display and speak.
    #[serde(default)]
    pub chat: String,
    /// Directive for the robot, if the reply carried one.
    #[serde(default)]
    pub act: Option<ActionDirective>,
    /// Any other fields the collaborator returned, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatReply {
    /// Reply with text only.
    pub fn text(chat: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            ..Self::default()
        }
    }

    /// Parse a raw chat collaborator body.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ParseError`] when the outer body is not JSON.
    /// A malformed inner `answer` is not an error.
    pub fn from_body(body: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(body)
            .map_err(|e| ChatError::ParseError(format!("chat response is not JSON: {e}")))?;
        Ok(Self::from_value(unwrap_answer(data)))
    }

    /// Build a reply from an already-unwrapped JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let chat = match fields.remove("chat") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                };
                let act = match fields.remove("act") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(ActionDirective(v)),
                };
                fields.remove("action_id");
                Self {
                    chat,
                    act,
                    extra: fields,
                }
            }
            Value::String(s) => Self::text(s),
            Value::Null => Self::default(),
            other => Self::text(other.to_string()),
        }
    }

    /// The directive, only when it is truthy.
    pub fn directive(&self) -> Option<&ActionDirective> {
        self.act.as_ref().filter(|act| act.is_truthy())
    }
}

/// Pick the reply payload out of the collaborator body.
///
/// A string `answer` gets a second decode attempt; the raw string is kept
/// when that fails. A missing or null `answer` means the body itself is the
/// payload.
fn unwrap_answer(mut data: Value) -> Value {
    let answer = data.as_object_mut().and_then(|obj| obj.remove("answer"));
    match answer {
        None | Some(Value::Null) => data,
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "answer is not encoded JSON; using raw text");
                Value::String(raw)
            }
        },
        Some(other) => other,
    }
}
