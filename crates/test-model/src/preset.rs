use relay_model::{ErrorKind, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// How a preset request fails instead of answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    Moderated,
    RateLimited,
    Unreachable,
}

impl PresetFailure {
    pub(crate) fn kind(self) -> ErrorKind {
        match self {
            PresetFailure::Moderated => ErrorKind::Moderated,
            PresetFailure::RateLimited => ErrorKind::RateLimitExceeded,
            PresetFailure::Unreachable => ErrorKind::Connection,
        }
    }
}

/// The preset answer to one request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request fails instead of streaming `events`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PresetFailure>,
    /// Milliseconds to wait before the first event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            ..Default::default()
        }
    }

    /// Creates a `PresetResponse` that streams `text` in a single delta.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a `PresetResponse` whose request fails.
    #[inline]
    pub fn failing(failure: PresetFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// Holds the first event back for `delay_ms` milliseconds.
    #[inline]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("I will search first.".to_string()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "1".to_string(),
                name: "search_google".to_string(),
                arguments: json!({ "query": "流感" }),
            }),
        ])
        .with_delay_ms(5);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();
        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_deserialize_failure() {
        let response: PresetResponse = serde_json::from_value(json!({
            "events": [],
            "failure": "rate_limited"
        }))
        .unwrap();
        assert_eq!(response.failure, Some(PresetFailure::RateLimited));
        assert_eq!(response.delay_ms, None);
    }
}
