//! Dead-letter routing for fatally failed records.
//!
//! Every ingress queue maps to exactly one dead-letter queue via a pure
//! naming function, so operators can locate and replay failed records
//! deterministically. Replay (pop from the DLQ, push back onto the origin
//! queue) is an administrative operation outside the hot path; the prefix
//! scheme keeps the origin recoverable by stripping it.

use std::sync::Arc;

use chainline_core::{QueueStore, RecordId};
use tracing::warn;

use crate::error::Result;

const DLQ_PREFIX: &str = "dlq:";

/// Computes the dead-letter queue name for an ingress queue.
///
/// Pure and injective: equal inputs yield equal outputs and distinct ingress
/// queues never collide on a DLQ name.
pub fn dlq_name(ingress_queue: &str) -> String {
    format!("{DLQ_PREFIX}{ingress_queue}")
}

/// Pushes fatally failed record ids onto per-ingress-queue DLQs.
pub struct DeadLetterRouter {
    queues: Arc<dyn QueueStore>,
}

impl DeadLetterRouter {
    /// Creates a router over the given queue store.
    pub fn new(queues: Arc<dyn QueueStore>) -> Self {
        Self { queues }
    }

    /// Routes a record id to the DLQ of the queue it was popped from.
    ///
    /// # Errors
    ///
    /// Returns an error if the push fails. The caller can only log it: the
    /// pop is already irreversible at this point.
    pub async fn route(&self, ingress_queue: &str, record_id: &RecordId) -> Result<()> {
        let dlq = dlq_name(ingress_queue);
        self.queues.push(&dlq, record_id).await.map_err(|e| {
            warn!(
                queue = %ingress_queue,
                dlq = %dlq,
                record_id = %record_id,
                error = %e,
                "dead-letter push failed"
            );
            e.into()
        })
    }
}
