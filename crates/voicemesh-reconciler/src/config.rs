//! Client timing configuration.

use std::time::Duration;

/// Timing knobs for the reconciler and its audit schedule.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between two consistency audits.
    pub audit_interval: Duration,

    /// Delay before the first audit after the session starts.
    pub first_audit_after: Duration,

    /// Minimum time between two desync diagnostics. Dead-link pruning runs
    /// on the same clock.
    pub desync_report_interval: Duration,

    /// Upper bound of random delay added to the first audit, so browsers
    /// that joined together do not audit in lockstep.
    pub initial_jitter: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            audit_interval: Duration::from_secs(5),
            first_audit_after: Duration::from_secs(1),
            desync_report_interval: Duration::from_secs(29),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl ReconcilerConfig {
    /// Shortest audit interval accepted.
    pub const MIN_AUDIT_INTERVAL: Duration = Duration::from_millis(100);

    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`AuditSchedule::new`](crate::AuditSchedule::new).
    pub fn validated(mut self) -> Self {
        if self.audit_interval < Self::MIN_AUDIT_INTERVAL {
            tracing::warn!(
                interval_ms = self.audit_interval.as_millis() as u64,
                "audit_interval below minimum, clamping"
            );
            self.audit_interval = Self::MIN_AUDIT_INTERVAL;
        }
        self
    }
}
