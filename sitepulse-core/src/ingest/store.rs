//! Storage seam for ingested batches

use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::types::{AnalyticsSummary, StoredBatch};

/// Append-only storage for batches
///
/// Implementations only need to append and scan; queries are answered by
/// scanning, which is fine for the volumes this endpoint is meant for.
pub trait BatchStore: Send + Sync {
    /// Append a batch. Batches are never deduplicated or deleted.
    fn append(&self, batch: StoredBatch) -> Result<()>;

    /// Every batch, in insertion order
    fn all_batches(&self) -> Result<Vec<StoredBatch>>;

    /// Batches containing at least one event of `session_id`, in insertion order
    fn batches_for_session(&self, session_id: &str) -> Result<Vec<StoredBatch>> {
        Ok(self
            .all_batches()?
            .into_iter()
            .filter(|stored| stored.batch.contains_session(session_id))
            .collect())
    }

    /// Aggregate counters over every batch
    fn summary(&self) -> Result<AnalyticsSummary> {
        Ok(AnalyticsSummary::from_batches(&self.all_batches()?))
    }
}

/// Process-lifetime, unbounded list of batches
///
/// Nothing survives a restart, and separate processes do not share state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    batches: RwLock<Vec<StoredBatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl BatchStore for MemoryStore {
    fn append(&self, batch: StoredBatch) -> Result<()> {
        self.batches.write().map_err(poisoned)?.push(batch);
        Ok(())
    }

    fn all_batches(&self) -> Result<Vec<StoredBatch>> {
        Ok(self.batches.read().map_err(poisoned)?.clone())
    }

    fn batches_for_session(&self, session_id: &str) -> Result<Vec<StoredBatch>> {
        Ok(self
            .batches
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|stored| stored.batch.contains_session(session_id))
            .cloned()
            .collect())
    }

    fn summary(&self) -> Result<AnalyticsSummary> {
        Ok(AnalyticsSummary::from_batches(
            self.batches.read().map_err(poisoned)?.iter(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Batch, ClientContext, Event, EventType};

    fn batch(sessions: &[(&str, EventType)]) -> StoredBatch {
        let events = sessions
            .iter()
            .map(|(session, event_type)| Event {
                event_type: *event_type,
                category: None,
                action: None,
                label: None,
                value: None,
                timestamp: 0,
                session_id: session.to_string(),
                user_id: None,
                properties: None,
            })
            .collect();
        StoredBatch::received_now(Batch::new(events, ClientContext::default()))
    }

    #[test]
    fn test_append_and_scan_in_order() {
        let store = MemoryStore::new();
        store.append(batch(&[("a", EventType::PageView)])).unwrap();
        store.append(batch(&[("b", EventType::Custom)])).unwrap();

        let all = store.all_batches().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].batch.events[0].session_id, "a");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_session_filter_matches_any_event() {
        let store = MemoryStore::new();
        store
            .append(batch(&[("a", EventType::PageView), ("b", EventType::PageView)]))
            .unwrap();
        store.append(batch(&[("a", EventType::Interaction)])).unwrap();
        store.append(batch(&[("c", EventType::Custom)])).unwrap();

        assert_eq!(store.batches_for_session("a").unwrap().len(), 2);
        assert_eq!(store.batches_for_session("b").unwrap().len(), 1);
        assert!(store.batches_for_session("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_summary_of_empty_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.summary().unwrap(), AnalyticsSummary::default());
    }

    #[test]
    fn test_summary_fifteen_events_two_sessions() {
        let store = MemoryStore::new();
        let mut first = vec![("s-1", EventType::PageView); 3];
        first.extend(vec![("s-1", EventType::Interaction); 5]);
        let mut second = vec![("s-2", EventType::PageView); 2];
        second.extend(vec![("s-2", EventType::Custom); 5]);
        store.append(batch(&first)).unwrap();
        store.append(batch(&second)).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total_events, 15);
        assert_eq!(summary.unique_sessions, 2);
        assert_eq!(summary.data_points, 2);
        assert_eq!(summary.event_types["page_view"], 5);
        assert_eq!(summary.event_types["interaction"], 5);
        assert_eq!(summary.event_types["custom"], 5);
    }
}
