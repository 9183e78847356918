//! Storage backend contract and registry.
//!
//! A storage backend is a named persistence target invoked during wrap-up.
//! Storage is best-effort and eventually consistent per backend: there is no
//! cross-backend atomicity or rollback, and one backend's failure never
//! prevents its siblings from being attempted.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use chainline_core::{LinkOptions, RecordId};

use crate::error::{EngineError, Result};

/// A named persistence target for processed records.
pub trait StorageBackend: Send + Sync + 'static {
    /// Persists the record identified by `record_id`.
    ///
    /// The backend fetches whatever payload state it needs from the external
    /// keyed store; the engine hands over only the identifier and options.
    ///
    /// # Errors
    ///
    /// Returns an error on write failure. Wrap-up catches it, logs it with
    /// the backend name and record id, and moves on to the next backend.
    fn save<'a>(
        &'a self,
        record_id: &'a RecordId,
        options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Fetches a previously saved payload, if the backend supports reads.
    fn get<'a>(
        &'a self,
        record_id: &'a RecordId,
        _options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send + 'a>> {
        let _ = record_id;
        Box::pin(async move { Ok(None) })
    }
}

impl std::fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StorageBackend")
    }
}

/// Name-to-implementation table for storage backends.
#[derive(Default)]
pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
}

impl StorageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under a name, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn StorageBackend>) {
        self.backends.insert(name.into(), backend);
    }

    /// Resolves a backend by name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownStorage` if no backend is registered
    /// under the name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StorageBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStorage(name.to_string()))
    }

    /// Names of all registered backends.
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when no backends are registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

pub mod mock {
    //! Mock storage backends for testing.
    //!
    //! `RecordingStorage` captures every save for later assertions;
    //! `FailingStorage` rejects every save, exercising the wrap-up isolation
    //! paths.

    use std::{future::Future, pin::Pin, sync::Arc};

    use chainline_core::{LinkOptions, RecordId};
    use tokio::sync::RwLock;

    use super::StorageBackend;
    use crate::error::{EngineError, Result};

    /// Backend that records every saved identifier in memory.
    #[derive(Clone, Default)]
    pub struct RecordingStorage {
        saved: Arc<RwLock<Vec<RecordId>>>,
    }

    impl RecordingStorage {
        /// Creates an empty recording backend.
        pub fn new() -> Self {
            Self::default()
        }

        /// All identifiers saved so far, in save order.
        pub async fn saved(&self) -> Vec<RecordId> {
            self.saved.read().await.clone()
        }
    }

    impl StorageBackend for RecordingStorage {
        fn save<'a>(
            &'a self,
            record_id: &'a RecordId,
            _options: &'a LinkOptions,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async move {
                self.saved.write().await.push(record_id.clone());
                Ok(())
            })
        }
    }

    /// Backend that fails every save with a fixed message.
    pub struct FailingStorage {
        name: String,
        message: String,
    }

    impl FailingStorage {
        /// Creates a backend that always fails with the given message.
        pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
            Self { name: name.into(), message: message.into() }
        }
    }

    impl StorageBackend for FailingStorage {
        fn save<'a>(
            &'a self,
            _record_id: &'a RecordId,
            _options: &'a LinkOptions,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async move {
                Err(EngineError::storage_failed(self.name.clone(), self.message.clone()))
            })
        }
    }
}
