use thiserror::Error;
use tracing::{info, warn};

use driftlog_client::{ClientError, LabApi};
use driftlog_common::Event;

use crate::buffer::LocalBuffer;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FlushError {
    /// The server answered with a non-success status; carries its response text.
    #[error("{0}")]
    Rejected(String),

    #[error("Failed to save bulk")]
    Unreachable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Upload `events` as one batch and clear the local buffer on success.
///
/// An empty list only clears the buffer. Any failure leaves the buffer as it
/// was, so the whole batch goes out again on the next attempt.
pub async fn flush(
    api: &dyn LabApi,
    buffer: &LocalBuffer,
    events: &[Event],
) -> Result<(), FlushError> {
    if events.is_empty() {
        buffer.clear()?;
        return Ok(());
    }

    match api.send_bulk(events).await {
        Ok(()) => {}
        Err(ClientError::Api { status, message }) => {
            warn!(status, "Bulk upload rejected");
            return Err(FlushError::Rejected(if message.is_empty() {
                format!("Error {status}")
            } else {
                message
            }));
        }
        Err(e) => {
            warn!(error = %e, "Bulk upload failed");
            return Err(FlushError::Unreachable);
        }
    }

    buffer.clear()?;
    info!(count = events.len(), "Bulk buffer flushed");
    Ok(())
}
