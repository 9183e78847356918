//! Ingress-queue to chain resolution.
//!
//! Rebuilt from a fresh configuration snapshot at the start of every worker
//! iteration. The map is ephemeral by design: the cost of staleness is
//! bounded by one iteration, which buys hot reload without any reload
//! signal.

use std::collections::HashMap;

use chainline_core::{ChainConfig, ChainSnapshot};

use crate::error::{EngineError, Result};

/// Mapping from ingress queue name to the chain that consumes it.
pub type RouteMap = HashMap<String, ChainConfig>;

/// Builds the ingress-to-chain routing table.
pub struct ChainResolver;

impl ChainResolver {
    /// Resolves every enabled chain's ingress queues into a routing table.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AmbiguousQueue` when two different enabled
    /// chains claim the same ingress queue, and `EngineError::InvalidChain`
    /// for a chain with no ingress queues. Both are configuration errors:
    /// they fail the whole resolution, not a single record.
    pub fn resolve(snapshot: &ChainSnapshot) -> Result<RouteMap> {
        let mut routes = RouteMap::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for chain in snapshot.chains() {
            if !chain.enabled {
                continue;
            }
            chain
                .validate()
                .map_err(|e| EngineError::invalid_chain(chain.name.clone(), e.to_string()))?;

            for queue in &chain.ingress_lists {
                match owners.get(queue) {
                    Some(owner) if owner == &chain.name => {
                        // Duplicate entry within one chain is harmless.
                        continue;
                    },
                    Some(owner) => {
                        return Err(EngineError::AmbiguousQueue {
                            queue: queue.clone(),
                            first: owner.clone(),
                            second: chain.name.clone(),
                        });
                    },
                    None => {
                        owners.insert(queue.clone(), chain.name.clone());
                        routes.insert(queue.clone(), chain.clone());
                    },
                }
            }
        }

        Ok(routes)
    }
}
