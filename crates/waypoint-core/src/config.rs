use std::time::Duration;

/// Process-level debugger configuration.
#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    /// Bounded capacity of the expression-evaluator cache.
    pub eval_cache_capacity: usize,
    /// How many times eviction polls an unloaded isolate's weak handle
    /// before giving up on prompt reclamation.
    pub gc_nudge_limit: u32,
    /// Sleep between reclamation polls.
    pub gc_nudge_interval: Duration,
    /// `EnvFilter` directives for the CLI subscriber, overridable via
    /// `WAYPOINT_LOG`.
    pub log_filter: String,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            eval_cache_capacity: 64,
            gc_nudge_limit: 10,
            gc_nudge_interval: Duration::from_millis(1),
            log_filter: "warn".to_string(),
        }
    }
}
