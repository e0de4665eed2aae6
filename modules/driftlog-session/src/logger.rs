//! Event logger: numbers, timestamps and dual-writes every session event.
//!
//! Each event is appended to the local buffer before `log` returns and is
//! sent to the stream endpoint from a detached task. Stream delivery is
//! at-most-once: failures are logged at debug level and otherwise dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::debug;

use driftlog_client::LabApi;
use driftlog_common::{to_wire_time, Event, EventKind};

use crate::buffer::LocalBuffer;
use crate::clock::Clock;
use crate::store::Result;

/// Outcome of a best-effort stream send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Delivered,
    Failed(String),
}

/// Send one event to the stream endpoint, reporting rather than raising failure.
pub async fn send_best_effort(api: &dyn LabApi, event: &Event) -> SendStatus {
    match api.send_stream(event).await {
        Ok(()) => SendStatus::Delivered,
        Err(e) => {
            debug!(seq = event.seq, error = %e, "Stream send failed");
            SendStatus::Failed(e.to_string())
        }
    }
}

/// Counts of stream sends that finished while settling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettleSummary {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct LoggerState {
    seq: u64,
    messages: VecDeque<String>,
}

pub struct EventLogger {
    user: String,
    api: Arc<dyn LabApi>,
    buffer: LocalBuffer,
    clock: Arc<dyn Clock>,
    state: Mutex<LoggerState>,
    in_flight: Mutex<JoinSet<SendStatus>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventLogger {
    pub fn new(
        user: impl Into<String>,
        api: Arc<dyn LabApi>,
        buffer: LocalBuffer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user: user.into(),
            api,
            buffer,
            clock,
            state: Mutex::new(LoggerState::default()),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Record an event: next sequence number, current client time, append to
    /// the local buffer, then fire off the stream send.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn log(&self, kind: EventKind, message: impl Into<String>) -> Result<Event> {
        let event = {
            let mut state = lock(&self.state);
            state.seq += 1;
            let event = Event {
                seq: state.seq,
                kind,
                message: message.into(),
                client_time: to_wire_time(self.clock.now()),
                user: self.user.clone(),
            };
            state
                .messages
                .push_front(format!("{}: {}", event.seq, event.message));
            // The buffer append happens under the same lock so buffer order
            // always matches sequence order.
            self.buffer.push(&event)?;
            event
        };

        let api = self.api.clone();
        let outgoing = event.clone();
        let mut in_flight = lock(&self.in_flight);
        // Reap finished sends so the set only holds what is still running.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move { send_best_effort(api.as_ref(), &outgoing).await });

        Ok(event)
    }

    /// Start a new session: sequence numbers restart at 1 and the on-screen log empties.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.seq = 0;
        state.messages.clear();
    }

    pub fn clear_messages(&self) {
        lock(&self.state).messages.clear();
    }

    /// On-screen log lines, most recent first.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.state).messages.iter().cloned().collect()
    }

    pub fn last_seq(&self) -> u64 {
        lock(&self.state).seq
    }

    /// Wait for every stream send started so far.
    pub async fn settle(&self) -> SettleSummary {
        let mut pending = std::mem::take(&mut *lock(&self.in_flight));
        let mut summary = SettleSummary::default();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(SendStatus::Delivered) => summary.delivered += 1,
                Ok(SendStatus::Failed(_)) | Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}
