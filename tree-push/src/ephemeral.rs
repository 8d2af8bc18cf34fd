//! Per-operation state that lives only while the process runs.
//!
//! Nothing here is persisted. A restart resets every counter and token.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tree_core::{FailureDomain, PhaseCounters};
use tree_types::{CloudFileExtension, OperationId};

use crate::error::{PushError, PushResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An object upload the server accepted only part of.
///
/// A resumed upload must send the same bytes the first part was cut from,
/// so the sealed object is kept alongside the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialUpload {
    /// Token the transport resumes from.
    pub continuation: String,
    /// The sealed object being uploaded.
    pub bytes: Vec<u8>,
}

/// Ephemeral information about one queued operation.
///
/// Shared between the scheduler, the transport callbacks and whoever
/// requests an abort. Flags are atomics; every other field has its own lock.
#[derive(Debug)]
pub struct EphemeralInfo {
    operation_id: OperationId,
    abort_requested: AtomicBool,
    resolve_by_pulling: AtomicBool,
    last_change_token: Mutex<Option<String>>,
    partial_rcrd: Mutex<Option<PartialUpload>>,
    partial_data: Mutex<Option<PartialUpload>>,
    duplicate_ops: Mutex<BTreeSet<OperationId>>,
    counters: Mutex<PhaseCounters>,
}

impl EphemeralInfo {
    /// Fresh state for `operation_id`.
    pub fn new(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            abort_requested: AtomicBool::new(false),
            resolve_by_pulling: AtomicBool::new(false),
            last_change_token: Mutex::new(None),
            partial_rcrd: Mutex::new(None),
            partial_data: Mutex::new(None),
            duplicate_ops: Mutex::new(BTreeSet::new()),
            counters: Mutex::new(PhaseCounters::new()),
        }
    }

    /// The operation this belongs to.
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    // ---------------------------------------------------------------------
    // Flags
    // ---------------------------------------------------------------------

    /// Mark the operation aborted. Returns `true` the first time only.
    pub fn request_abort(&self) -> bool {
        !self.abort_requested.swap(true, Ordering::AcqRel)
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    /// Set or clear the resolve-by-pulling flag.
    pub fn set_resolve_by_pulling(&self, value: bool) {
        self.resolve_by_pulling.store(value, Ordering::Release);
    }

    /// Whether a pull must run before this operation can be retried.
    pub fn resolve_by_pulling(&self) -> bool {
        self.resolve_by_pulling.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // Tokens
    // ---------------------------------------------------------------------

    /// Change token of the last successful metadata write.
    pub fn last_change_token(&self) -> Option<String> {
        lock(&self.last_change_token).clone()
    }

    /// Remember the change token to send with the next attempt.
    pub fn set_last_change_token(&self, token: Option<String>) {
        *lock(&self.last_change_token) = token;
    }

    fn partial_slot(&self, ext: CloudFileExtension) -> &Mutex<Option<PartialUpload>> {
        match ext {
            CloudFileExtension::Rcrd => &self.partial_rcrd,
            CloudFileExtension::Data => &self.partial_data,
        }
    }

    /// Resumable-upload token of the `ext` object.
    pub fn continuation(&self, ext: CloudFileExtension) -> Option<String> {
        lock(self.partial_slot(ext))
            .as_ref()
            .map(|partial| partial.continuation.clone())
    }

    /// The interrupted upload of the `ext` object.
    pub fn partial_upload(&self, ext: CloudFileExtension) -> Option<PartialUpload> {
        lock(self.partial_slot(ext)).clone()
    }

    /// Record an interrupted upload of the `ext` object, or clear it once
    /// the object is complete.
    pub fn set_partial_upload(&self, ext: CloudFileExtension, partial: Option<PartialUpload>) {
        *lock(self.partial_slot(ext)) = partial;
    }

    // ---------------------------------------------------------------------
    // Duplicates
    // ---------------------------------------------------------------------

    /// Queued operations made redundant by this one.
    pub fn duplicate_ops(&self) -> Vec<OperationId> {
        lock(&self.duplicate_ops).iter().copied().collect()
    }

    /// Record operations whose effect this one captures.
    pub fn add_duplicates(&self, ids: impl IntoIterator<Item = OperationId>) {
        lock(&self.duplicate_ops).extend(ids);
    }

    /// Remove and return every recorded duplicate.
    pub fn take_duplicates(&self) -> Vec<OperationId> {
        std::mem::take(&mut *lock(&self.duplicate_ops))
            .into_iter()
            .collect()
    }

    // ---------------------------------------------------------------------
    // Failure counters
    // ---------------------------------------------------------------------

    /// Count a failure in `domain`, returning the new consecutive count.
    ///
    /// Refused with [`PushError::Aborted`] once the operation is aborted.
    pub fn record_failure(&self, domain: FailureDomain, status: Option<u32>) -> PushResult<u32> {
        let mut counters = lock(&self.counters);
        if self.is_aborted() {
            return Err(PushError::Aborted(self.operation_id));
        }
        Ok(counters.record_failure(domain, status))
    }

    /// Reset the counter of `domain` only.
    ///
    /// Refused with [`PushError::Aborted`] once the operation is aborted.
    pub fn record_success(&self, domain: FailureDomain) -> PushResult<()> {
        let mut counters = lock(&self.counters);
        if self.is_aborted() {
            return Err(PushError::Aborted(self.operation_id));
        }
        counters.record_success(domain);
        Ok(())
    }

    /// Start counting from zero, after the user resolved an escalation.
    pub fn reset_counters(&self) -> PushResult<()> {
        let mut counters = lock(&self.counters);
        if self.is_aborted() {
            return Err(PushError::Aborted(self.operation_id));
        }
        *counters = PhaseCounters::new();
        Ok(())
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> PhaseCounters {
        lock(&self.counters).clone()
    }
}
