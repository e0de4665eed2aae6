use tracing::info;
use uuid::Uuid;

use crate::store::{KvStore, Result, USER_ID_KEY};

/// The stable per-store user identifier, created on first use.
pub fn user_id(store: &dyn KvStore) -> Result<String> {
    if let Some(id) = store.get(USER_ID_KEY)? {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    let id = Uuid::new_v4().to_string();
    store.set(USER_ID_KEY, &id)?;
    info!(user = %id, "Generated new user identifier");
    Ok(id)
}
