//! Volunteer pool load balancing
//!
//! Each state's volunteer pool is split into numbered pod channels; new
//! voters are dealt across pods round-robin via a counter in the shared
//! cache. The counter bump is a read-then-write, not an atomic increment:
//! two concurrent voters can land in the same pod, which only skews load
//! and never affects delivery.

use crate::db::{Database, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BalancerError {
    /// `numPods` missing or zero for this state/demo combination. A
    /// configuration error: the routing attempt is rejected rather than
    /// producing a channel name from a modulo-by-zero.
    #[error("no pods configured for {key}")]
    Unconfigured { key: String },
    #[error(transparent)]
    Store(#[from] DbError),
}

#[derive(Clone)]
pub struct LoadBalancer {
    db: Database,
}

impl LoadBalancer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Assign the next voter for a state to a pod channel,
    /// e.g. `"north-carolina-1"` or `"demo-north-carolina-0"`.
    pub fn select_pod(&self, state_name: &str, is_demo: bool) -> Result<String, BalancerError> {
        let demo = if is_demo { "Demo" } else { "" };
        let squashed: String = state_name.split_whitespace().collect();
        let num_pods_key = format!("numPods{demo}{squashed}");
        let counter_key = format!("voterCounter{demo}{squashed}");

        // Both counters in one batched read
        let values = self.db.get_values(&[&num_pods_key, &counter_key])?;
        let num_pods: i64 = values[0]
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if num_pods <= 0 {
            return Err(BalancerError::Unconfigured { key: num_pods_key });
        }
        let counter: i64 = values[1]
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let selected = counter % num_pods;
        self.db.set_value(&counter_key, &(counter + 1).to_string())?;

        let slug = state_name
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        let prefix = if is_demo { "demo-" } else { "" };
        Ok(format!("{prefix}{slug}-{selected}"))
    }
}
