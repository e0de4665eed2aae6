//! Single-sample clock offset between the client and the lab server.
//!
//! `offset = serverTime - localNow`, with `localNow` read after the response
//! has been parsed. Network latency is not compensated.

use thiserror::Error;
use tracing::{debug, warn};

use driftlog_client::{ClientError, LabApi};
use driftlog_common::{fmt_offset, parse_millis};

use crate::clock::Clock;

pub const OFFSET_FETCH_FAILED: &str = "Failed to fetch server time";

#[derive(Debug, Error)]
pub enum OffsetError {
    #[error(transparent)]
    Fetch(#[from] ClientError),

    #[error("Unparseable server time: {0:?}")]
    BadTimestamp(String),
}

/// Query the time endpoint once and compute the offset in milliseconds.
pub async fn estimate_offset(api: &dyn LabApi, clock: &dyn Clock) -> Result<i64, OffsetError> {
    let response = api.server_time().await?;
    let server_ms = parse_millis(&response.server_time)
        .ok_or_else(|| OffsetError::BadTimestamp(response.server_time.clone()))?;
    Ok(server_ms - clock.now().timestamp_millis())
}

/// Holds the last good offset for a session and the line shown to the user.
#[derive(Debug, Clone, Default)]
pub struct OffsetEstimator {
    offset_ms: i64,
    status: String,
}

impl OffsetEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// `Server clock offset: +12ms`, the fetch error line, or empty before the first estimate.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Re-estimate. On a failed fetch the previous offset stays and the
    /// status line reports the failure; an unparseable timestamp changes nothing.
    pub async fn refresh(&mut self, api: &dyn LabApi, clock: &dyn Clock) {
        match estimate_offset(api, clock).await {
            Ok(offset_ms) => {
                debug!(offset_ms, "Estimated server clock offset");
                self.offset_ms = offset_ms;
                self.status = format!("Server clock offset: {}", fmt_offset(offset_ms));
            }
            Err(OffsetError::Fetch(e)) => {
                warn!(error = %e, "Server time request failed");
                self.status = OFFSET_FETCH_FAILED.to_string();
            }
            Err(e @ OffsetError::BadTimestamp(_)) => {
                warn!(error = %e, "Ignoring server time");
            }
        }
    }
}
