//! In-memory stand-in for the lab API.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use driftlog_client::{ClientError, LabApi, Result};
use driftlog_common::{
    parse_millis, to_wire_time, BulkPayload, Event, ListResponse, StreamRecord, TimeResponse,
};

#[derive(Default)]
pub(crate) struct LabState {
    stream: Vec<StreamRecord>,
    bulk: Vec<Event>,
    bulk_calls: usize,
    stream_attempts: usize,
}

/// Records what a real server would record. Stream records are stamped with
/// the event's client time plus `stream_lag_ms`.
#[derive(Default)]
pub struct MemoryLab {
    pub(crate) state: Mutex<LabState>,
    pub stream_lag_ms: i64,
    pub server_time: Option<DateTime<Utc>>,
    pub reject_bulk: Option<(u16, String)>,
    pub bulk_unreachable: bool,
    pub list_unreachable: bool,
    pub time_unreachable: bool,
    pub reset_unreachable: bool,
    /// Every n-th stream send is refused (1-based), when set.
    pub drop_stream_every: Option<usize>,
}

impl MemoryLab {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LabState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stream_len(&self) -> usize {
        self.state().stream.len()
    }

    pub fn bulk_events(&self) -> Vec<Event> {
        self.state().bulk.clone()
    }

    pub fn bulk_calls(&self) -> usize {
        self.state().bulk_calls
    }
}

fn unreachable() -> ClientError {
    ClientError::Network("connection refused".to_string())
}

#[async_trait]
impl LabApi for MemoryLab {
    async fn send_stream(&self, event: &Event) -> Result<()> {
        let mut state = self.state();
        state.stream_attempts += 1;
        if let Some(n) = self.drop_stream_every {
            if state.stream_attempts % n == 0 {
                return Err(unreachable());
            }
        }
        let server_time = parse_millis(&event.client_time)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| to_wire_time(t + Duration::milliseconds(self.stream_lag_ms)));
        state.stream.push(StreamRecord {
            event: event.clone(),
            server_time,
        });
        Ok(())
    }

    async fn send_bulk(&self, events: &[Event]) -> Result<()> {
        let mut state = self.state();
        state.bulk_calls += 1;
        if self.bulk_unreachable {
            return Err(unreachable());
        }
        if let Some((status, message)) = &self.reject_bulk {
            return Err(ClientError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        state.bulk.extend_from_slice(events);
        Ok(())
    }

    async fn list(&self) -> Result<ListResponse> {
        if self.list_unreachable {
            return Err(unreachable());
        }
        let state = self.state();
        Ok(ListResponse {
            stream: state.stream.clone(),
            bulk: BulkPayload::new(state.bulk.clone()),
        })
    }

    async fn reset(&self) -> Result<()> {
        if self.reset_unreachable {
            return Err(unreachable());
        }
        let mut state = self.state();
        state.stream.clear();
        state.bulk.clear();
        Ok(())
    }

    async fn server_time(&self) -> Result<TimeResponse> {
        if self.time_unreachable {
            return Err(unreachable());
        }
        let now = self.server_time.unwrap_or_else(Utc::now);
        Ok(TimeResponse {
            server_time: to_wire_time(now),
        })
    }
}
