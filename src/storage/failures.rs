//! failure_events and component_states trees

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{get, put, scan_all, scan_since, time_key, StorageError, Store};
use crate::types::{ComponentState, FailureEvent};

impl Store {
    /// Insert or overwrite a failure event (keyed by its timestamp and id).
    pub fn save_failure_event(&self, event: &FailureEvent) -> Result<(), StorageError> {
        put(&self.failure_events, time_key(event.timestamp, event.id), event)
    }

    /// Failure events created at or after `since`, oldest first.
    pub fn failure_events_since(&self, since: DateTime<Utc>) -> Result<Vec<FailureEvent>, StorageError> {
        scan_since(&self.failure_events, since)
    }

    /// Look up an event by id. Linear scan; ids are not indexed.
    pub fn find_failure_event(&self, id: Uuid) -> Result<Option<FailureEvent>, StorageError> {
        let events: Vec<FailureEvent> = scan_all(&self.failure_events)?;
        Ok(events.into_iter().find(|e| e.id == id))
    }

    /// Mark a stored event resolved at `at`.
    pub fn resolve_failure_event(&self, event: &FailureEvent, at: DateTime<Utc>) -> Result<(), StorageError> {
        let key = time_key(event.timestamp, event.id);
        let mut stored: FailureEvent = get(&self.failure_events, key)?
            .ok_or_else(|| StorageError::NotFound(format!("failure event {}", event.id)))?;
        stored.mark_resolved(at);
        put(&self.failure_events, key, &stored)
    }

    pub fn save_component_state(&self, state: &ComponentState) -> Result<(), StorageError> {
        put(&self.component_states, state.component.as_bytes(), state)
    }

    pub fn component_state(&self, component: &str) -> Result<Option<ComponentState>, StorageError> {
        get(&self.component_states, component.as_bytes())
    }

    /// All component states, ordered by component name.
    pub fn component_states(&self) -> Result<Vec<ComponentState>, StorageError> {
        scan_all(&self.component_states)
    }
}
