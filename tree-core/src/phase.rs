//! Per-operation failure counters.
//!
//! An upload passes through three independent failure domains. Each keeps
//! its own consecutive-failure count, and a success in one domain only
//! resets that domain.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureDomain {
    /// Object-storage PUT/GET.
    Transport,
    /// Asynchronous confirmation that the server saw the object.
    Notification,
    /// Server-side acceptance of the uploaded object.
    Processing,
}

impl FailureDomain {
    /// Every domain.
    pub const ALL: [FailureDomain; 3] = [
        FailureDomain::Transport,
        FailureDomain::Notification,
        FailureDomain::Processing,
    ];
}

impl fmt::Display for FailureDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureDomain::Transport => "transport",
            FailureDomain::Notification => "notification",
            FailureDomain::Processing => "processing",
        })
    }
}

/// Failure state of one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCounter {
    /// Consecutive failures since the last success in this domain.
    pub failures: u32,
    /// Status of the most recent failure (HTTP status for transport,
    /// extended status code for processing).
    pub last_status: Option<u32>,
}

/// Failure counters of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounters {
    transport: DomainCounter,
    notification: DomainCounter,
    processing: DomainCounter,
    cycles: u32,
}

impl PhaseCounters {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn domain_mut(&mut self, domain: FailureDomain) -> &mut DomainCounter {
        match domain {
            FailureDomain::Transport => &mut self.transport,
            FailureDomain::Notification => &mut self.notification,
            FailureDomain::Processing => &mut self.processing,
        }
    }

    /// State of one domain.
    pub fn domain(&self, domain: FailureDomain) -> DomainCounter {
        match domain {
            FailureDomain::Transport => self.transport,
            FailureDomain::Notification => self.notification,
            FailureDomain::Processing => self.processing,
        }
    }

    /// Record a failure in `domain`, returning its new consecutive count.
    ///
    /// Failures after the upload went through (notification, processing)
    /// also count as a completed retry cycle.
    pub fn record_failure(&mut self, domain: FailureDomain, status: Option<u32>) -> u32 {
        if domain != FailureDomain::Transport {
            self.cycles = self.cycles.saturating_add(1);
        }
        let counter = self.domain_mut(domain);
        counter.failures = counter.failures.saturating_add(1);
        if status.is_some() {
            counter.last_status = status;
        }
        counter.failures
    }

    /// Record a success in `domain`. The other domains are left untouched.
    pub fn record_success(&mut self, domain: FailureDomain) {
        self.domain_mut(domain).failures = 0;
    }

    /// Consecutive failures in `domain`.
    pub fn failures(&self, domain: FailureDomain) -> u32 {
        self.domain(domain).failures
    }

    /// Status of the last failure in `domain`.
    pub fn last_status(&self, domain: FailureDomain) -> Option<u32> {
        self.domain(domain).last_status
    }

    /// Attempts that got past the upload and then failed.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}
