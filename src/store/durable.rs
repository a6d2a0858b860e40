//! Lazily-initialized handle to the durable store.
//!
//! The backend is opened on first use. A failed open leaves the handle empty
//! so the next call tries again.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::DatabaseError;
use crate::store::libsql_backend::LibSqlBackend;
use crate::store::traits::DurableStore;

pub struct DurableHandle {
    config: Option<StoreConfig>,
    store: OnceCell<Arc<dyn DurableStore>>,
}

impl DurableHandle {
    /// No durable store; every caller goes to the fallback path.
    pub fn disabled() -> Self {
        Self {
            config: None,
            store: OnceCell::new(),
        }
    }

    /// Open the configured backend on first use.
    pub fn from_config(config: Option<StoreConfig>) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    /// Wrap an already-open store.
    pub fn with_store(store: Arc<dyn DurableStore>) -> Self {
        Self {
            config: None,
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some() || self.store.initialized()
    }

    /// The durable store, opening it if needed.
    ///
    /// `Ok(None)` means no store is configured; `Err` means opening failed.
    pub async fn get(&self) -> Result<Option<Arc<dyn DurableStore>>, DatabaseError> {
        if let Some(store) = self.store.get() {
            return Ok(Some(Arc::clone(store)));
        }
        let Some(config) = &self.config else {
            return Ok(None);
        };

        let store = self
            .store
            .get_or_try_init(|| async {
                open(config).await.inspect_err(|e| {
                    warn!(error = %e, "Durable store unavailable, will retry on next call");
                })
            })
            .await?;
        Ok(Some(Arc::clone(store)))
    }
}

async fn open(config: &StoreConfig) -> Result<Arc<dyn DurableStore>, DatabaseError> {
    let backend = match config {
        StoreConfig::Remote { url, token } => {
            LibSqlBackend::new_remote(url, token.expose_secret()).await?
        }
        StoreConfig::Local { path } => LibSqlBackend::new_local(path).await?,
    };
    Ok(Arc::new(backend))
}
