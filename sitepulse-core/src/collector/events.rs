//! Event construction for the collector
//!
//! Instrumentation calls produce an [`EventDraft`]: everything the caller
//! knows about the event. The buffer stamps the draft with the capture time,
//! the session ID and the current user ID to produce a wire [`Event`].
//!
//! ## Field mapping
//!
//! | Call | type | category | action | label | value |
//! |------|------|----------|--------|-------|-------|
//! | `track_page_view(path, title)` | `page_view` | `navigation` | path | title | - |
//! | `track_interaction(c, a, l, v)` | `interaction` | c | a | l | v |
//! | `track_custom_event(name, props)` | `custom` | `custom` | name | - | - |

use crate::types::{Event, EventType};

/// Category used for page views
pub const PAGE_VIEW_CATEGORY: &str = "navigation";

/// Category used for custom events
pub const CUSTOM_CATEGORY: &str = "custom";

/// An event before it has been stamped with time and session.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub category: Option<String>,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl EventDraft {
    pub fn page_view(path: &str, title: Option<&str>) -> Self {
        Self {
            event_type: EventType::PageView,
            category: Some(PAGE_VIEW_CATEGORY.to_string()),
            action: Some(path.to_string()),
            label: title.map(str::to_string),
            value: None,
            properties: None,
        }
    }

    pub fn interaction(
        category: &str,
        action: &str,
        label: Option<&str>,
        value: Option<f64>,
    ) -> Self {
        Self {
            event_type: EventType::Interaction,
            category: Some(category.to_string()),
            action: Some(action.to_string()),
            label: label.map(str::to_string),
            value,
            properties: None,
        }
    }

    pub fn custom(
        name: &str,
        properties: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        Self {
            event_type: EventType::Custom,
            category: Some(CUSTOM_CATEGORY.to_string()),
            action: Some(name.to_string()),
            label: None,
            value: None,
            properties,
        }
    }

    /// Turn the draft into a wire event.
    pub fn stamp(self, timestamp: i64, session_id: &str, user_id: Option<&str>) -> Event {
        Event {
            event_type: self.event_type,
            category: self.category,
            action: self.action,
            label: self.label,
            value: self.value,
            timestamp,
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_view_mapping() {
        let draft = EventDraft::page_view("/projects", Some("Projects"));
        assert_eq!(draft.event_type, EventType::PageView);
        assert_eq!(draft.category.as_deref(), Some("navigation"));
        assert_eq!(draft.action.as_deref(), Some("/projects"));
        assert_eq!(draft.label.as_deref(), Some("Projects"));
    }

    #[test]
    fn test_interaction_mapping() {
        let draft = EventDraft::interaction("button", "click", Some("cta"), Some(3.0));
        assert_eq!(draft.event_type, EventType::Interaction);
        assert_eq!(draft.category.as_deref(), Some("button"));
        assert_eq!(draft.value, Some(3.0));
    }

    #[test]
    fn test_custom_keeps_properties() {
        let mut props = serde_json::Map::new();
        props.insert("theme".to_string(), serde_json::json!("dark"));

        let event = EventDraft::custom("theme_toggle", Some(props)).stamp(42, "s-1", Some("u-1"));

        assert_eq!(event.event_type, EventType::Custom);
        assert_eq!(event.action.as_deref(), Some("theme_toggle"));
        assert_eq!(event.timestamp, 42);
        assert_eq!(event.session_id, "s-1");
        assert_eq!(event.user_id.as_deref(), Some("u-1"));
        assert_eq!(event.properties.unwrap()["theme"], "dark");
    }
}
