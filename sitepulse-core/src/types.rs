//! Core domain types for sitepulse
//!
//! These types are shared by the collector (which produces them) and the
//! ingestion endpoint (which validates and stores them). Field names follow
//! the JSON wire format, which is camelCase.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | A discrete observation: a page view, an interaction or a custom event |
//! | **Session** | A client-generated identifier scoping events to one collector lifetime |
//! | **Batch** | Buffered events plus client context, sent in one request |
//! | **Flush** | Removing buffered events from the collector and attempting delivery |
//! | **Consent** | Client preference gating whether tracking happens at all |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Maximum number of characters of the user agent kept in a batch.
pub const MAX_USER_AGENT_CHARS: usize = 200;

// ============================================
// Events
// ============================================

/// Kind of event. This set is closed: anything else is rejected at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    Interaction,
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::Interaction => "interaction",
            EventType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_view" => Ok(EventType::PageView),
            "interaction" => Ok(EventType::Interaction),
            "custom" => Ok(EventType::Custom),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// A single analytics event as it travels on the wire.
///
/// Every event belongs to exactly one session. Events are never acknowledged
/// individually; the unit of transfer is a [`Batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Event {
    /// Closed event kind
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Free-text classifier (e.g. "navigation", "button")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Free-text classifier (e.g. the path or "click")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Free-text classifier, sanitized on ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Optional numeric payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// Client capture time, epoch milliseconds
    pub timestamp: i64,

    /// Session this event belongs to
    pub session_id: String,

    /// User ID, if one was set on the collector before capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Arbitrary properties attached to custom events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

// ============================================
// Client context
// ============================================

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Environment of the client that produced a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub screen: Dimensions,
    #[serde(default)]
    pub viewport: Dimensions,
}

impl ClientContext {
    /// Build a context, truncating the user agent to [`MAX_USER_AGENT_CHARS`].
    pub fn new(
        user_agent: &str,
        language: impl Into<String>,
        timezone: impl Into<String>,
        screen: Dimensions,
        viewport: Dimensions,
    ) -> Self {
        Self {
            user_agent: truncate_user_agent(user_agent),
            language: language.into(),
            timezone: timezone.into(),
            screen,
            viewport,
        }
    }
}

/// Keep at most [`MAX_USER_AGENT_CHARS`] characters (not bytes).
pub fn truncate_user_agent(user_agent: &str) -> String {
    user_agent.chars().take(MAX_USER_AGENT_CHARS).collect()
}

// ============================================
// Batches
// ============================================

/// An ordered list of events plus client context.
///
/// A batch has no identity beyond its contents; the server does not deduplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub events: Vec<Event>,

    #[serde(flatten)]
    pub context: ClientContext,
}

impl Batch {
    pub fn new(events: Vec<Event>, context: ClientContext) -> Self {
        Self { events, context }
    }

    /// True if at least one event belongs to `session_id`.
    pub fn contains_session(&self, session_id: &str) -> bool {
        self.events.iter().any(|e| e.session_id == session_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A batch as kept by the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBatch {
    #[serde(flatten)]
    pub batch: Batch,

    /// Server receive time
    pub received_at: DateTime<Utc>,
}

impl StoredBatch {
    pub fn received_now(batch: Batch) -> Self {
        Self {
            batch,
            received_at: Utc::now(),
        }
    }
}

// ============================================
// Summary
// ============================================

/// Aggregate counters over every stored batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_events: usize,
    pub unique_sessions: usize,
    pub event_types: BTreeMap<String, usize>,
    pub data_points: usize,
}

impl AnalyticsSummary {
    /// Compute the summary by scanning every batch.
    pub fn from_batches<'a, I>(batches: I) -> Self
    where
        I: IntoIterator<Item = &'a StoredBatch>,
    {
        let mut summary = AnalyticsSummary::default();
        let mut sessions: HashSet<&str> = HashSet::new();

        for stored in batches {
            summary.data_points += 1;
            for event in &stored.batch.events {
                summary.total_events += 1;
                sessions.insert(event.session_id.as_str());
                *summary
                    .event_types
                    .entry(event.event_type.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        summary.unique_sessions = sessions.len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, session: &str) -> Event {
        Event {
            event_type,
            category: None,
            action: None,
            label: None,
            value: None,
            timestamp: 1_700_000_000_000,
            session_id: session.to_string(),
            user_id: None,
            properties: None,
        }
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EventType::PageView).unwrap(),
            "page_view"
        );
        assert_eq!("interaction".parse::<EventType>(), Ok(EventType::Interaction));
        assert!("pageview".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_serializes_camel_case_and_omits_none() {
        let mut e = event(EventType::Interaction, "s-1");
        e.user_id = Some("u-1".to_string());
        let json = serde_json::to_value(&e).unwrap();

        assert_eq!(json["type"], "interaction");
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["userId"], "u-1");
        assert!(json.get("label").is_none());
        assert!(json.get("properties").is_none());
    }

    #[test]
    fn test_event_rejects_unknown_fields() {
        let json = r#"{"type":"custom","timestamp":1,"sessionId":"s","extra":true}"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_truncate_user_agent_counts_chars() {
        let ua = "é".repeat(250);
        let truncated = truncate_user_agent(&ua);
        assert_eq!(truncated.chars().count(), MAX_USER_AGENT_CHARS);

        assert_eq!(truncate_user_agent("short"), "short");
    }

    #[test]
    fn test_batch_wire_shape_is_flat() {
        let batch = Batch::new(
            vec![event(EventType::PageView, "s-1")],
            ClientContext::new(
                "agent",
                "en-US",
                "UTC",
                Dimensions::new(1920, 1080),
                Dimensions::new(1280, 720),
            ),
        );
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["userAgent"], "agent");
        assert_eq!(json["screen"]["width"], 1920);
        assert_eq!(json["viewport"]["height"], 720);
        assert!(json["events"].is_array());
    }

    #[test]
    fn test_summary_counts() {
        let first = StoredBatch::received_now(Batch::new(
            vec![
                event(EventType::PageView, "a"),
                event(EventType::Interaction, "a"),
                event(EventType::Interaction, "b"),
            ],
            ClientContext::default(),
        ));
        let second = StoredBatch::received_now(Batch::new(
            vec![event(EventType::Custom, "b")],
            ClientContext::default(),
        ));

        let summary = AnalyticsSummary::from_batches([&first, &second]);
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.unique_sessions, 2);
        assert_eq!(summary.data_points, 2);
        assert_eq!(summary.event_types["interaction"], 2);
        assert_eq!(summary.event_types.get("page_view"), Some(&1));
    }
}
