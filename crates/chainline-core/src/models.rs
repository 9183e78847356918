//! Domain models for chain processing.
//!
//! A record is known to the engine only by its opaque identifier; the payload
//! lives in an external keyed store mutated by link implementations. Chains
//! bind ingress queues to an ordered list of links plus egress/storage
//! fan-out targets.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Opaque identifier for a conversation record.
///
/// Identifiers are stable across an entire chain pass; the engine never
/// inspects or mutates the payload they point to. A link may substitute a
/// different identifier via its `Continue` result (e.g. after merging two
/// records), which becomes the working id for the rest of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier. Used by tests and ingest tooling.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// String-keyed options passed unchanged to every link and storage
/// invocation.
pub type LinkOptions = serde_json::Map<String, serde_json::Value>;

/// Merges invocation options: explicit options override module defaults.
pub fn merge_options(defaults: &LinkOptions, explicit: &LinkOptions) -> LinkOptions {
    let mut merged = defaults.clone();
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Configuration for one processing chain.
///
/// Reloaded fresh at the start of every consumer-loop iteration, so edits to
/// the chain table take effect within one iteration without any reload
/// signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain name, unique within a deployment.
    pub name: String,

    /// Ordered link names executed sequentially. May be empty, in which case
    /// a popped record goes straight to wrap-up.
    #[serde(default)]
    pub links: Vec<String>,

    /// Storage backend names for the wrap-up fan-out. May be empty.
    #[serde(default)]
    pub storages: Vec<String>,

    /// Queues this chain consumes from. Must be non-empty.
    pub ingress_lists: Vec<String>,

    /// Queues completed records are forwarded to. May be empty.
    #[serde(default)]
    pub egress_lists: Vec<String>,

    /// Disabled chains are skipped during route resolution.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Advisory processing budget in seconds. Not enforced mid-execution;
    /// workers are never interrupted inside a chain pass.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl ChainConfig {
    /// Returns the advisory timeout as a `Duration`, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    /// Validates structural invariants of the chain definition.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidInput("chain name must not be empty".to_string()));
        }
        if self.ingress_lists.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "chain {} has no ingress queues",
                self.name
            )));
        }
        Ok(())
    }
}

/// Immutable snapshot of all configured chains.
///
/// Produced by one `ConfigSource::load` call and consumed for exactly one
/// worker iteration; staleness is bounded by one iteration.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    chains: Arc<[ChainConfig]>,
}

impl ChainSnapshot {
    /// Builds a snapshot from a list of chain definitions.
    pub fn new(chains: Vec<ChainConfig>) -> Self {
        Self { chains: chains.into() }
    }

    /// Builds a snapshot with no chains.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// All chains in the snapshot, enabled or not.
    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    /// Number of chains in the snapshot.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// True when the snapshot holds no chains.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(pairs: &[(&str, serde_json::Value)]) -> LinkOptions {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn explicit_options_override_defaults() {
        let defaults = options(&[("level", json!("debug")), ("redact", json!(true))]);
        let explicit = options(&[("level", json!("info"))]);

        let merged = merge_options(&defaults, &explicit);

        assert_eq!(merged.get("level"), Some(&json!("info")));
        assert_eq!(merged.get("redact"), Some(&json!(true)));
    }

    #[test]
    fn record_id_is_opaque_and_stable() {
        let id = RecordId::new("rec-42");
        assert_eq!(id.as_str(), "rec-42");
        assert_eq!(id.to_string(), "rec-42");
        assert_eq!(RecordId::from("rec-42"), id);
    }

    #[test]
    fn chain_timeout_is_optional() {
        let mut chain = ChainConfig {
            name: "default".to_string(),
            links: vec![],
            storages: vec![],
            ingress_lists: vec!["inbound".to_string()],
            egress_lists: vec![],
            enabled: true,
            timeout_seconds: None,
        };
        assert_eq!(chain.timeout(), None);

        chain.timeout_seconds = Some(30);
        assert_eq!(chain.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn chain_without_ingress_is_invalid() {
        let chain = ChainConfig {
            name: "orphan".to_string(),
            links: vec![],
            storages: vec![],
            ingress_lists: vec![],
            egress_lists: vec![],
            enabled: true,
            timeout_seconds: None,
        };
        assert!(chain.validate().is_err());
    }

    #[test]
    fn chain_deserializes_with_defaults() {
        let yaml_equivalent = serde_json::json!({
            "name": "minimal",
            "ingress_lists": ["inbound"],
        });
        let chain: ChainConfig = serde_json::from_value(yaml_equivalent).unwrap();

        assert!(chain.enabled);
        assert!(chain.links.is_empty());
        assert!(chain.storages.is_empty());
        assert!(chain.egress_lists.is_empty());
        assert_eq!(chain.timeout_seconds, None);
    }
}
