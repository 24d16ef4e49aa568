use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Post;
use crate::error::DecodeError;

/// Event type tags the dispatch router cares about.
pub mod event_type {
    /// A new post was created.
    pub const POSTED: &str = "posted";
    /// The server said hello after authentication.
    pub const HELLO: &str = "hello";
}

/// Delivery target of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Broadcast {
    /// Users excluded from delivery.
    pub omit_users: Option<HashMap<String, bool>>,
    /// Single target user, if any.
    pub user_id: String,
    /// Target channel, if any.
    pub channel_id: String,
    /// Target team, if any.
    pub team_id: String,
}

/// An inbound notification from the server's event stream.
///
/// `data` is an untyped payload bag. Several fields (`post`, `mentions`)
/// carry JSON documents encoded as strings; the `decode_*` helpers parse
/// those a second time. Events are immutable once received and are shared
/// between roles behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSocketEvent {
    /// Event type tag, e.g. `posted`.
    pub event: String,
    /// Payload bag.
    #[serde(default)]
    pub data: HashMap<String, Value>,
    /// Delivery target.
    #[serde(default)]
    pub broadcast: Broadcast,
    /// Sequence number assigned by the server.
    #[serde(default)]
    pub seq: i64,
}

impl WebSocketEvent {
    /// Creates an event with an empty payload.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    /// Adds a payload field, builder style.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns `true` for `posted` events.
    pub fn is_posted(&self) -> bool {
        self.event == event_type::POSTED
    }

    /// Decodes the serialized message record in `data["post"]`.
    pub fn decode_post(&self) -> Result<Post, DecodeError> {
        self.decode_field("post")
    }

    /// Decodes the serialized list of mentioned user ids in `data["mentions"]`.
    pub fn decode_mentions(&self) -> Result<Vec<String>, DecodeError> {
        self.decode_field("mentions")
    }

    /// Returns `true` if `data["mentions"]` decodes and contains `user_id`.
    pub fn mentions(&self, user_id: &str) -> Result<bool, DecodeError> {
        Ok(self.decode_mentions()?.iter().any(|id| id == user_id))
    }

    fn decode_field<T: DeserializeOwned>(&self, field: &'static str) -> Result<T, DecodeError> {
        let value = self
            .data
            .get(field)
            .ok_or(DecodeError::MissingField(field))?;

        let malformed = |e: serde_json::Error| DecodeError::Malformed {
            field,
            reason: e.to_string(),
        };

        // The server double-encodes nested documents as JSON strings.
        match value {
            Value::String(text) => serde_json::from_str(text).map_err(malformed),
            other => T::deserialize(other).map_err(malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posted(post: Value) -> WebSocketEvent {
        WebSocketEvent::new("posted").with_data("post", post)
    }

    #[test]
    fn test_parse_wire_event() {
        let raw = r#"{
            "event": "posted",
            "data": {
                "channel_type": "O",
                "mentions": "[\"bot-id\"]",
                "post": "{\"id\":\"p1\",\"user_id\":\"u1\",\"channel_id\":\"c1\",\"message\":\"hi @bot\"}"
            },
            "broadcast": {"omit_users": null, "user_id": "", "channel_id": "c1", "team_id": ""},
            "seq": 7
        }"#;

        let event: WebSocketEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_posted());
        assert_eq!(event.seq, 7);
        assert_eq!(event.broadcast.channel_id, "c1");

        let post = event.decode_post().unwrap();
        assert_eq!(post.id, "p1");
        assert_eq!(post.message, "hi @bot");
        assert!(event.mentions("bot-id").unwrap());
        assert!(!event.mentions("someone-else").unwrap());
    }

    #[test]
    fn test_decode_post_accepts_inline_object() {
        let event = posted(json!({"id": "p2", "message": "inline"}));
        assert_eq!(event.decode_post().unwrap().message, "inline");
    }

    #[test]
    fn test_decode_missing_field() {
        let event = WebSocketEvent::new("posted");
        assert!(matches!(
            event.decode_post(),
            Err(DecodeError::MissingField("post"))
        ));
        assert!(matches!(
            event.decode_mentions(),
            Err(DecodeError::MissingField("mentions"))
        ));
    }

    #[test]
    fn test_decode_malformed_field() {
        let event = posted(json!("{not json"));
        assert!(matches!(
            event.decode_post(),
            Err(DecodeError::Malformed { field: "post", .. })
        ));

        let event = WebSocketEvent::new("posted").with_data("mentions", "[1, 2]");
        assert!(matches!(
            event.mentions("bot"),
            Err(DecodeError::Malformed {
                field: "mentions",
                ..
            })
        ));
    }
}
