//! When to stop retrying.

use serde::{Deserialize, Serialize};

use crate::phase::{FailureDomain, PhaseCounters};

/// Why an operation was taken out of the retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Escalation {
    /// One domain failed too many times in a row.
    Threshold(FailureDomain),
    /// The operation keeps getting past the upload and failing later.
    Loop,
}

/// Outcome of evaluating a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Schedule another attempt.
    Retry,
    /// Stop retrying and surface the operation as a conflict.
    Escalate(Escalation),
}

/// Failure thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive transport failures before escalating (default: 5).
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,
    /// Consecutive notification failures before escalating (default: 10).
    #[serde(default = "default_max_notification_failures")]
    pub max_notification_failures: u32,
    /// Consecutive processing failures before escalating (default: 3).
    #[serde(default = "default_max_processing_failures")]
    pub max_processing_failures: u32,
    /// Post-upload failures of any kind before escalating (default: 8).
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
}

fn default_max_transport_failures() -> u32 {
    5
}

fn default_max_notification_failures() -> u32 {
    10
}

fn default_max_processing_failures() -> u32 {
    3
}

fn default_max_cycles() -> u32 {
    8
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transport_failures: default_max_transport_failures(),
            max_notification_failures: default_max_notification_failures(),
            max_processing_failures: default_max_processing_failures(),
            max_cycles: default_max_cycles(),
        }
    }
}

impl RetryPolicy {
    /// Threshold of one domain.
    pub fn threshold(&self, domain: FailureDomain) -> u32 {
        match domain {
            FailureDomain::Transport => self.max_transport_failures,
            FailureDomain::Notification => self.max_notification_failures,
            FailureDomain::Processing => self.max_processing_failures,
        }
    }

    /// Decide what to do after a failure in `domain` was recorded.
    pub fn evaluate(&self, counters: &PhaseCounters, domain: FailureDomain) -> Verdict {
        if counters.failures(domain) >= self.threshold(domain) {
            Verdict::Escalate(Escalation::Threshold(domain))
        } else if counters.cycles() >= self.max_cycles {
            Verdict::Escalate(Escalation::Loop)
        } else {
            Verdict::Retry
        }
    }
}
