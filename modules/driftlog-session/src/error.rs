use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Local storage failed: {0}")]
    Store(#[from] StoreError),
}
