//! User registry: one record per numeric phone number.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::pipeline::normalize::numeric_phone;
use crate::store::durable::DurableHandle;

/// What `ensure_user` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSync {
    Created,
    Renamed,
    Unchanged,
    /// No durable store, or the number has no digits.
    Skipped,
    /// A store call failed; already logged.
    Failed,
}

pub struct UserRegistry {
    durable: Arc<DurableHandle>,
}

impl UserRegistry {
    pub fn new(durable: Arc<DurableHandle>) -> Self {
        Self { durable }
    }

    /// Create or rename the user for `phone_number`. Never fails the caller.
    pub async fn ensure_user(&self, phone_number: &str, name: &str) -> UserSync {
        let Some(phone) = numeric_phone(phone_number) else {
            debug!(phone_number = %phone_number, "Sender number has no digits, skipping user sync");
            return UserSync::Skipped;
        };

        match self.sync(phone, name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(phone, error = %e, "User registry update failed");
                UserSync::Failed
            }
        }
    }

    async fn sync(&self, phone: i64, name: &str) -> Result<UserSync, DatabaseError> {
        let Some(store) = self.durable.get().await? else {
            return Ok(UserSync::Skipped);
        };

        match store.get_user_by_phone(phone).await? {
            None => {
                store.create_user(name, phone).await?;
                debug!(phone, "Registered new user");
                Ok(UserSync::Created)
            }
            Some(user) if user.name != name => {
                store.update_user_name(phone, name).await?;
                debug!(phone, "Updated user name");
                Ok(UserSync::Renamed)
            }
            Some(_) => Ok(UserSync::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::libsql_backend::LibSqlBackend;

    async fn registry() -> UserRegistry {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        UserRegistry::new(Arc::new(DurableHandle::with_store(Arc::new(backend))))
    }

    #[tokio::test]
    async fn create_rename_noop() {
        let registry = registry().await;
        assert_eq!(registry.ensure_user("+1 555 0001", "Alice").await, UserSync::Created);
        assert_eq!(registry.ensure_user("15550001", "Alice").await, UserSync::Unchanged);
        assert_eq!(registry.ensure_user("+15550001", "Ally").await, UserSync::Renamed);
    }

    #[tokio::test]
    async fn non_numeric_sender_is_skipped() {
        let registry = registry().await;
        assert_eq!(registry.ensure_user("+", "Ghost").await, UserSync::Skipped);
    }

    #[tokio::test]
    async fn unconfigured_store_is_skipped() {
        let registry = UserRegistry::new(Arc::new(DurableHandle::disabled()));
        assert_eq!(registry.ensure_user("+15550001", "Alice").await, UserSync::Skipped);
    }
}
