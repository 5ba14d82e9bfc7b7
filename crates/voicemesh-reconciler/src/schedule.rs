//! Audit schedule for the reconciler.
//!
//! Fires once shortly after the session starts, then on a fixed interval.
//! Sits in the driver's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         frame = socket.next() => { /* relay directives */ }
//!         tick = schedule.wait_for_audit() => {
//!             state.audit(tick.at);
//!         }
//!     }
//! }
//! ```
//!
//! Missed audits are never replayed: a late wake-up schedules the next
//! audit one interval from now.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

use crate::ReconcilerConfig;

/// Information about one fired audit.
#[derive(Debug, Clone, Copy)]
pub struct AuditTick {
    /// Monotonically increasing audit number, starting at 1.
    pub count: u64,
    /// When the audit fired.
    pub at: Instant,
    /// Whether the audit fired noticeably late.
    pub late: bool,
}

/// Timer driving periodic consistency audits.
#[derive(Debug)]
pub struct AuditSchedule {
    interval: Duration,
    next: Instant,
    count: u64,
}

impl AuditSchedule {
    /// Creates a schedule whose first audit fires after
    /// `first_audit_after` plus a random share of `initial_jitter`.
    pub fn new(config: &ReconcilerConfig) -> Self {
        let config = config.clone().validated();
        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
        };

        Self {
            interval: config.audit_interval,
            next: Instant::now() + config.first_audit_after + jitter,
            count: 0,
        }
    }

    /// Waits until the next audit is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// deadline untouched.
    pub async fn wait_for_audit(&mut self) -> AuditTick {
        time::sleep_until(self.next).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(self.next);
        let late = late_by > self.interval / 10;
        if late {
            warn!(
                audit = self.count + 1,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "audit fired late, skipping ahead"
            );
        }

        self.count += 1;
        self.next = now + self.interval;
        trace!(audit = self.count, "audit due");

        AuditTick {
            count: self.count,
            at: now,
            late,
        }
    }

    /// Number of audits fired so far.
    pub fn audit_count(&self) -> u64 {
        self.count
    }

    /// The fixed interval between audits.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
