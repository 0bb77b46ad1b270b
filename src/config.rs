use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the refresh engine and its schedulers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of presentable listings held by the rotation store.
    pub capacity: usize,
    /// Interval between scheduled refresh cycles.
    pub cycle_interval: Duration,
    /// Cron expression for the full-wipe rotation (None disables it).
    pub wipe_schedule: Option<String>,
    /// Delay between consecutive vetting dispatches, to be polite to the
    /// vetting upstream. Not a correctness requirement.
    pub vetting_dispatch_delay: Duration,
    /// Per-request timeout applied by the HTTP feed adapters.
    pub feed_timeout: Duration,
    /// Chains the engine scans each cycle.
    pub chains: Vec<crate::types::Chain>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            cycle_interval: Duration::from_secs(120),
            wipe_schedule: Some("0 0 0 * * *".to_string()), // daily at midnight UTC
            vetting_dispatch_delay: Duration::from_millis(250),
            feed_timeout: Duration::from_secs(10),
            chains: vec![crate::types::Chain::Solana],
        }
    }
}
