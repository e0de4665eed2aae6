use std::sync::Arc;

use driftlog_common::Event;

use crate::store::{KvStore, Result, StoreError, BULK_EVENTS_KEY};

/// Append-only list of events waiting for the bulk upload.
#[derive(Clone)]
pub struct LocalBuffer {
    store: Arc<dyn KvStore>,
}

impl LocalBuffer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Everything buffered so far. A missing key reads as empty.
    pub fn read(&self) -> Result<Vec<Event>> {
        match self.store.get(BULK_EVENTS_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: BULK_EVENTS_KEY.to_string(),
                message: e.to_string(),
            }),
        }
    }

    pub fn write(&self, events: &[Event]) -> Result<()> {
        let raw = serde_json::to_string(events).map_err(|e| StoreError::Corrupt {
            key: BULK_EVENTS_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(BULK_EVENTS_KEY, &raw)
    }

    pub fn push(&self, event: &Event) -> Result<()> {
        let mut events = self.read()?;
        events.push(event.clone());
        self.write(&events)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(BULK_EVENTS_KEY)
    }
}
