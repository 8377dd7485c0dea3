//! Tagged Envelope
//!
//! Text frames on the judging feed and the overlay push channel share one
//! shape:
//!
//! ```text
//! { "type": "judging:update", "body": { ... } }
//! ```
//!
//! The SSE connector rewrites `event:`/`data:` pairs into this shape so that
//! every consumer decodes the same way.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::{TransportError, WireMessage};

/// A `{type, body}` frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message-type tag
    #[serde(rename = "type")]
    pub tag: String,
    /// Payload; `null` when the frame carried none
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Create an envelope from a tag and an already-built body
    pub fn new(tag: impl Into<String>, body: Value) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }

    /// Create an envelope by serializing `body`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if `body` cannot be
    /// represented as JSON.
    pub fn wrap<T: Serialize>(tag: impl Into<String>, body: &T) -> Result<Self, TransportError> {
        Ok(Self::new(tag, serde_json::to_value(body)?))
    }

    /// Parse a text frame
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if the frame is not a
    /// JSON object with a string `type`.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode to a text frame
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if encoding fails.
    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize the body into a concrete type
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if the body does not match.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(T::deserialize(&self.body)?)
    }
}

impl WireMessage for Envelope {
    fn decode(text: &str) -> Result<Self, TransportError> {
        Self::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_tagged_frame() {
        let env = Envelope::parse(r#"{"type":"judging:end","body":{"event_id":4}}"#).unwrap();
        assert_eq!(env.tag, "judging:end");
        assert_eq!(env.body, json!({"event_id": 4}));
    }

    #[test]
    fn test_missing_body_is_null() {
        let env = Envelope::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.body, Value::Null);
    }

    #[test]
    fn test_missing_type_is_rejected() {
        assert!(Envelope::parse(r#"{"body":{}}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn test_encode_uses_type_key() {
        let text = Envelope::new("snapshot", json!([])).encode().unwrap();
        assert_eq!(text, r#"{"type":"snapshot","body":[]}"#);
    }

    #[test]
    fn test_body_as() {
        #[derive(Deserialize)]
        struct Body {
            event_id: u32,
        }

        let env = Envelope::new("judging:end", json!({"event_id": 9}));
        let body: Body = env.body_as().unwrap();
        assert_eq!(body.event_id, 9);
    }
}
