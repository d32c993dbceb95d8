//! # The Default Engine
//!
//! The default implementation of [`Engine`] is [`DefaultEngine`]. Log files are read through an
//! [`object_store`] and parquet checkpoints are decoded with the `parquet` crate.

use std::sync::Arc;

use object_store::DynObjectStore;
use url::Url;

use self::parquet::ParquetCheckpointHandler;
use self::storage::ObjectStoreStorageHandler;
use crate::coordinator::CommitCoordinatorClient;
use crate::{CheckpointHandler, DeltaResult, Engine, StorageHandler};

pub mod parquet;
pub mod storage;

#[derive(Clone)]
pub struct DefaultEngine {
    store: Arc<DynObjectStore>,
    storage: Arc<ObjectStoreStorageHandler>,
    checkpoint: Arc<ParquetCheckpointHandler>,
    coordinator: Option<Arc<dyn CommitCoordinatorClient>>,
}

impl std::fmt::Debug for DefaultEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultEngine")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator.is_some())
            .finish()
    }
}

impl DefaultEngine {
    /// Create a new [`DefaultEngine`] instance
    ///
    /// # Parameters
    ///
    /// - `table_root`: The URL of the table within storage.
    /// - `options`: key/value pairs of options to pass to the object store, e.g. credentials or
    ///   the region of a bucket.
    pub fn try_new<I, K, V>(table_root: &Url, options: I) -> DeltaResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (store, _) = object_store::parse_url_opts(table_root, options)?;
        Ok(Self::new(Arc::from(store)))
    }

    /// Create a new [`DefaultEngine`] instance over an existing store. Urls are mapped to store
    /// paths by their path component, so the store must be rooted where the urls' paths start.
    pub fn new(store: Arc<DynObjectStore>) -> Self {
        Self {
            storage: Arc::new(ObjectStoreStorageHandler::new(store.clone())),
            checkpoint: Arc::new(ParquetCheckpointHandler),
            store,
            coordinator: None,
        }
    }

    /// Consult `coordinator` for commits that are not backfilled into `_delta_log` yet.
    pub fn with_commit_coordinator(mut self, coordinator: Arc<dyn CommitCoordinatorClient>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn get_object_store(&self) -> Arc<DynObjectStore> {
        self.store.clone()
    }
}

impl Engine for DefaultEngine {
    fn get_storage_handler(&self) -> Arc<dyn StorageHandler> {
        self.storage.clone()
    }

    fn get_checkpoint_handler(&self) -> Arc<dyn CheckpointHandler> {
        self.checkpoint.clone()
    }

    fn get_commit_coordinator(&self) -> Option<Arc<dyn CommitCoordinatorClient>> {
        self.coordinator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_memory_and_local() {
        let engine = DefaultEngine::try_new(
            &Url::parse("memory:///table/").unwrap(),
            std::iter::empty::<(&str, &str)>(),
        )
        .unwrap();
        assert!(engine.get_commit_coordinator().is_none());

        let tmp = tempfile::tempdir().unwrap();
        let url = Url::from_directory_path(tmp.path()).unwrap();
        assert!(DefaultEngine::try_new(&url, std::iter::empty::<(&str, &str)>()).is_ok());
    }

    #[test]
    fn test_try_new_rejects_unknown_scheme() {
        let url = Url::parse("foo://bucket/table").unwrap();
        assert!(DefaultEngine::try_new(&url, std::iter::empty::<(&str, &str)>()).is_err());
    }
}
