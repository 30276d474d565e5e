use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// A structured bridge message.
///
/// The same shape flows worker → host on stdout (after `GSMMSG:`), host →
/// worker on stdin (after `GSMCMD:`), and in both directions over the
/// control WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Verb naming the action or event.
    pub function: String,

    /// Optional payload object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Optional correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Message {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            data: None,
            id: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parse a JSON message body.
    ///
    /// A body without a non-empty `function` string is rejected.
    pub fn from_json(raw: &str) -> Result<Self> {
        let message: Message = serde_json::from_str(raw)?;
        message.validated()
    }

    /// Parse a JSON message body from bytes.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let message: Message = serde_json::from_slice(raw)?;
        message.validated()
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up a field in `data`.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }

    fn validated(self) -> Result<Self> {
        if self.function.is_empty() {
            return Err(FrameError::MissingFunction);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_message() {
        let msg = Message::from_json(r#"{"function":"notify","data":{"k":1},"id":"a1"}"#).unwrap();
        assert_eq!(msg.function, "notify");
        assert_eq!(msg.data_field("k"), Some(&json!(1)));
        assert_eq!(msg.id.as_deref(), Some("a1"));
    }

    #[test]
    fn null_id_and_missing_data_are_absent() {
        let msg = Message::from_json(r#"{"function":"ping","id":null}"#).unwrap();
        assert!(msg.data.is_none());
        assert!(msg.id.is_none());
    }

    #[test]
    fn missing_function_is_rejected() {
        assert!(matches!(
            Message::from_json(r#"{"data":{}}"#),
            Err(FrameError::InvalidJson(_))
        ));
        assert!(matches!(
            Message::from_json(r#"{"function":""}"#),
            Err(FrameError::MissingFunction)
        ));
    }

    #[test]
    fn non_object_data_is_rejected() {
        assert!(Message::from_json(r#"{"function":"x","data":[1,2]}"#).is_err());
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let json = Message::new("quit").to_json().unwrap();
        assert_eq!(json, r#"{"function":"quit"}"#);
    }
}
