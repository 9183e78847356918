//! Link contract and registry.
//!
//! A link is one named processing step in a chain. Its primary effect is
//! mutating externally-stored payload state; the engine only sees the
//! identifier flowing through and the control-flow outcome of each
//! invocation. Link implementations are resolved by name through an explicit
//! registry populated at startup, which keeps late binding by name while the
//! compiler checks every implementation against the contract.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use chainline_core::{LinkOptions, RecordId};

use crate::error::{EngineError, Result};

/// Outcome of one link invocation.
///
/// An explicit sum type: there is no "falsy means stop" convention. Raising
/// an error is the third outcome and is fatal for the record's chain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    /// Processing continues with the given identifier, which becomes the
    /// working id for subsequent links and for wrap-up. Usually the input id
    /// unchanged; a link that merges records may substitute a new one.
    Continue(RecordId),

    /// Stop executing further links in this pass. Wrap-up still runs with
    /// the identifier produced by the last successful link.
    Halt,
}

/// A named processing step.
///
/// Implementations must be cheap to clone behind `Arc` and safe to invoke
/// concurrently from multiple workers. Returning `Err` marks the record
/// fatal for this pass: no further links run, wrap-up is skipped, and the
/// record is dead-lettered by the worker.
pub trait Link: Send + Sync + 'static {
    /// Runs this link against one record.
    ///
    /// `link_name` is the name the chain resolved this implementation
    /// under, so one implementation registered under several names can
    /// specialise its behaviour.
    fn invoke<'a>(
        &'a self,
        record_id: &'a RecordId,
        link_name: &'a str,
        options: &'a LinkOptions,
    ) -> Pin<Box<dyn Future<Output = Result<LinkResult>> + Send + 'a>>;

    /// Default invocation options, overridden key-by-key by explicit
    /// configuration.
    fn default_options(&self) -> LinkOptions {
        LinkOptions::new()
    }
}

impl std::fmt::Debug for dyn Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Link")
    }
}

/// Name-to-implementation table for links.
///
/// Populated once at startup and shared immutably by every worker for the
/// process lifetime; resolution is a map lookup, so there is nothing further
/// to cache.
#[derive(Default)]
pub struct LinkRegistry {
    links: HashMap<String, Arc<dyn Link>>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a link implementation under a name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, name: impl Into<String>, link: Arc<dyn Link>) {
        self.links.insert(name.into(), link);
    }

    /// Resolves a link by name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownLink` if no implementation is registered
    /// under the name. The executor treats this as a configuration error and
    /// fails the pass before any link runs.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Link>> {
        self.links.get(name).cloned().ok_or_else(|| EngineError::UnknownLink(name.to_string()))
    }

    /// Names of all registered links.
    pub fn names(&self) -> Vec<&str> {
        self.links.keys().map(String::as_str).collect()
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True when no links are registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PassThrough;

    impl Link for PassThrough {
        fn invoke<'a>(
            &'a self,
            record_id: &'a RecordId,
            _link_name: &'a str,
            _options: &'a LinkOptions,
        ) -> Pin<Box<dyn Future<Output = Result<LinkResult>> + Send + 'a>> {
            Box::pin(async move { Ok(LinkResult::Continue(record_id.clone())) })
        }
    }

    #[test]
    fn resolve_unknown_link_is_configuration_error() {
        let registry = LinkRegistry::new();
        let error = registry.resolve("transcribe").unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn registered_link_resolves_and_invokes() {
        let mut registry = LinkRegistry::new();
        registry.register("passthrough", Arc::new(PassThrough));

        let link = registry.resolve("passthrough").unwrap();
        let id = RecordId::new("rec-1");
        let result = link.invoke(&id, "passthrough", &LinkOptions::new()).await.unwrap();
        assert_eq!(result, LinkResult::Continue(id));
    }
}
