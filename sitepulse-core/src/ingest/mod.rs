//! Batch ingestion
//!
//! Turns a raw request body into a sanitized [`Batch`] and hands it to a
//! [`BatchStore`].
//!
//! ## Validation
//!
//! | Body | Result |
//! |------|--------|
//! | not JSON | [`IngestError::Malformed`] |
//! | `events` missing or not an array | [`IngestError::InvalidPayload`] |
//! | an event that does not match the event schema | [`IngestError::InvalidEvent`] |
//! | context field with the wrong type | [`IngestError::InvalidContext`] |
//!
//! Context fields that are absent default to empty values.
//!
//! ## Sanitization
//!
//! - `userAgent` is truncated to 200 characters
//! - every `label` keeps only ASCII word characters, whitespace and `-`

mod store;

pub use store::{BatchStore, MemoryStore};

use serde_json::Value;
use thiserror::Error;

use crate::types::{truncate_user_agent, Batch, ClientContext, Event};

/// Why a request body was rejected
#[derive(Error, Debug)]
pub enum IngestError {
    /// Body is not valid JSON
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `events` is missing or not a list
    #[error("Invalid payload")]
    InvalidPayload,

    /// An event does not match the event schema
    #[error("Invalid event at index {index}: {reason}")]
    InvalidEvent { index: usize, reason: String },

    /// A client context field has the wrong type
    #[error("Invalid client context: {0}")]
    InvalidContext(String),
}

/// Parse and validate a request body.
pub fn parse_payload(body: &[u8]) -> Result<Batch, IngestError> {
    let mut value: Value = serde_json::from_slice(body)?;

    let raw_events = match value.as_object_mut().and_then(|obj| obj.remove("events")) {
        Some(Value::Array(events)) => events,
        _ => return Err(IngestError::InvalidPayload),
    };

    let events = raw_events
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_value::<Event>(raw).map_err(|e| IngestError::InvalidEvent {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let context: ClientContext =
        serde_json::from_value(value).map_err(|e| IngestError::InvalidContext(e.to_string()))?;

    Ok(Batch::new(events, context))
}

/// Apply server-side sanitization to a batch.
pub fn sanitize(mut batch: Batch) -> Batch {
    batch.context.user_agent = truncate_user_agent(&batch.context.user_agent);
    for event in &mut batch.events {
        if let Some(label) = event.label.as_mut() {
            *label = sanitize_label(label);
        }
    }
    batch
}

/// Keep `[A-Za-z0-9_]`, whitespace and `-`; drop everything else.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn valid_event() -> Value {
        json!({
            "type": "interaction",
            "category": "button",
            "action": "click",
            "label": "cta",
            "value": 2,
            "timestamp": 1_700_000_000_000i64,
            "sessionId": "s-1"
        })
    }

    #[test]
    fn test_parse_full_payload() {
        let batch = parse_payload(&body(json!({
            "events": [valid_event()],
            "userAgent": "Mozilla/5.0",
            "language": "en-US",
            "timezone": "Europe/Berlin",
            "screen": {"width": 1920, "height": 1080},
            "viewport": {"width": 1280, "height": 720}
        })))
        .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.events[0].event_type, EventType::Interaction);
        assert_eq!(batch.events[0].value, Some(2.0));
        assert_eq!(batch.context.timezone, "Europe/Berlin");
        assert_eq!(batch.context.viewport.width, 1280);
    }

    #[test]
    fn test_missing_context_defaults() {
        let batch = parse_payload(&body(json!({"events": []}))).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.context, ClientContext::default());
    }

    #[test]
    fn test_events_not_an_array_is_invalid_payload() {
        let err = parse_payload(&body(json!({"events": "not-an-array"}))).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload));
        assert_eq!(err.to_string(), "Invalid payload");

        let err = parse_payload(&body(json!({"userAgent": "x"}))).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload));

        let err = parse_payload(&body(json!([1, 2, 3]))).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_payload(b"{\"events\": [").unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    #[test]
    fn test_invalid_event_reports_index() {
        let mut bad = valid_event();
        bad["type"] = json!("purchase");

        let err = parse_payload(&body(json!({"events": [valid_event(), bad]}))).unwrap_err();
        match err {
            IngestError::InvalidEvent { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_event_with_unknown_field_is_rejected() {
        let mut bad = valid_event();
        bad["html"] = json!("<b>");
        let err = parse_payload(&body(json!({"events": [bad]}))).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent { index: 0, .. }));
    }

    #[test]
    fn test_event_missing_session_is_rejected() {
        let err = parse_payload(&body(json!({
            "events": [{"type": "page_view", "timestamp": 1}]
        })))
        .unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent { index: 0, .. }));
    }

    #[test]
    fn test_bad_context_type() {
        let err = parse_payload(&body(json!({
            "events": [],
            "screen": "1920x1080"
        })))
        .unwrap_err();
        assert!(matches!(err, IngestError::InvalidContext(_)));
    }

    #[test]
    fn test_sanitize_label_strips_markup() {
        assert_eq!(
            sanitize_label("<script>alert(1)</script>"),
            "scriptalert1script"
        );
        assert_eq!(sanitize_label("hero-cta button_2"), "hero-cta button_2");
        assert_eq!(sanitize_label("café!"), "caf");
    }

    #[test]
    fn test_sanitize_batch() {
        let mut event = valid_event();
        event["label"] = json!("<b>bold</b>");
        let batch = parse_payload(&body(json!({
            "events": [event],
            "userAgent": "a".repeat(300)
        })))
        .unwrap();

        let batch = sanitize(batch);
        assert_eq!(batch.context.user_agent.len(), 200);
        assert_eq!(batch.events[0].label.as_deref(), Some("bboldb"));
    }
}
