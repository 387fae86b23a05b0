//! Engine-wide tunables, collected in one place so `Graph` construction
//! doesn't grow a constructor parameter per knob.

use std::time::Duration;

/// Configuration for query execution's safety ceilings and timeouts.
/// `Default` matches the recommended values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-query timeout. Minimum 1s, default 30s.
    pub query_timeout: Duration,
    /// Safety ceiling for unbounded variable-length patterns (`*`, `*2..`).
    pub var_length_ceiling: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            var_length_ceiling: crate::execution::VAR_LENGTH_CEILING,
        }
    }
}

impl EngineConfig {
    /// Clamp `query_timeout` to the documented minimum of 1s.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout.max(Duration::from_secs(1));
        self
    }
}
