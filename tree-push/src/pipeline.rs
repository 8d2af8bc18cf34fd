//! Operation queue and retry bookkeeping.
//!
//! The pipeline owns every queued [`CloudOperation`] together with its
//! [`OperationState`] and [`EphemeralInfo`]. It applies events to the state
//! machine and performs the bookkeeping actions (counters, requeueing,
//! escalation, duplicate release). The I/O actions (`Upload`, `Poll`) are
//! left to the [`PushEngine`](crate::PushEngine).

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use tree_core::{Action, Escalation, Event, OperationState, RetryPolicy, Verdict};
use tree_types::{OperationId, UserId};

use crate::ephemeral::EphemeralInfo;
use crate::error::{PushError, PushResult};
use crate::operation::CloudOperation;

#[derive(Debug)]
struct Entry {
    operation: CloudOperation,
    state: OperationState,
    info: Arc<EphemeralInfo>,
}

/// An operation handed to the engine by [`PushPipeline::dispatch_next`].
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The operation to run.
    pub operation: CloudOperation,
    /// Its ephemeral state.
    pub info: Arc<EphemeralInfo>,
}

/// Counts of operations by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Waiting in the queue.
    pub pending: usize,
    /// Dispatched or awaiting the server.
    pub in_flight: usize,
    /// Waiting for a pull.
    pub needs_pull: usize,
    /// Out of the retry cycle.
    pub escalated: usize,
    /// Captured by another queued operation.
    pub captured: usize,
}

/// Queue of outbound operations.
#[derive(Debug)]
pub struct PushPipeline {
    policy: RetryPolicy,
    queue: Mutex<VecDeque<OperationId>>,
    ops: DashMap<OperationId, Entry>,
}

impl PushPipeline {
    /// Create an empty pipeline.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            queue: Mutex::new(VecDeque::new()),
            ops: DashMap::new(),
        }
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<OperationId>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an operation.
    pub fn enqueue(&self, operation: CloudOperation) -> OperationId {
        let id = operation.id;
        debug!(operation_id = %id, kind = ?operation.kind, "enqueued operation");
        self.ops.insert(
            id,
            Entry {
                operation,
                state: OperationState::new(),
                info: Arc::new(EphemeralInfo::new(id)),
            },
        );
        self.queue().push_back(id);
        id
    }

    /// Number of tracked operations, including escalated and captured ones.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations waiting to be dispatched.
    pub fn queued(&self) -> usize {
        self.queue().len()
    }

    /// State of an operation.
    pub fn state(&self, id: &OperationId) -> Option<OperationState> {
        self.ops.get(id).map(|entry| entry.state)
    }

    /// Ephemeral state of an operation.
    pub fn info(&self, id: &OperationId) -> Option<Arc<EphemeralInfo>> {
        self.ops.get(id).map(|entry| Arc::clone(&entry.info))
    }

    /// A tracked operation.
    pub fn operation(&self, id: &OperationId) -> Option<CloudOperation> {
        self.ops.get(id).map(|entry| entry.operation.clone())
    }

    /// Whether any tracked operation matches `predicate`.
    pub fn contains(&self, predicate: impl Fn(&CloudOperation) -> bool) -> bool {
        self.ops.iter().any(|entry| predicate(&entry.operation))
    }

    /// Take the next pending operation off the queue and mark it dispatched.
    ///
    /// Queued operations it captures are taken off the queue as well and
    /// recorded as its duplicates.
    pub fn dispatch_next(&self) -> Option<Dispatch> {
        let mut queue = self.queue();
        while let Some(id) = queue.pop_front() {
            let operation = match self.ops.get(&id) {
                Some(entry)
                    if entry.state == OperationState::Pending && !entry.info.is_aborted() =>
                {
                    entry.operation.clone()
                }
                _ => continue,
            };

            let mut captured = Vec::new();
            queue.retain(|other| {
                let is_captured = other != &id
                    && self
                        .ops
                        .get(other)
                        .map(|o| operation.captures(&o.operation))
                        .unwrap_or(false);
                if is_captured {
                    captured.push(*other);
                }
                !is_captured
            });

            let Some(mut entry) = self.ops.get_mut(&id) else {
                continue;
            };
            if !captured.is_empty() {
                debug!(operation_id = %id, captured = captured.len(), "captured duplicate operations");
                entry.info.add_duplicates(captured);
            }

            let (state, _actions) = entry.state.on_event(Event::Dispatched);
            entry.state = state;
            return Some(Dispatch {
                operation,
                info: Arc::clone(&entry.info),
            });
        }
        None
    }

    /// Apply an event to an operation and run the resulting bookkeeping.
    ///
    /// Returns the state the operation ends up in, after any retry or
    /// escalation decision.
    pub fn report(&self, id: OperationId, event: Event) -> PushResult<OperationState> {
        let (state, actions, info) = {
            let mut entry = self.ops.get_mut(&id).ok_or(PushError::UnknownOperation(id))?;
            if entry.info.is_aborted() && event != Event::AbortRequested {
                return Err(PushError::Aborted(id));
            }
            let (state, actions) = entry.state.on_event(event);
            entry.state = state;
            (state, actions, Arc::clone(&entry.info))
        };

        let mut state = state;
        for action in actions {
            if let Some(next) = self.apply(id, &info, action)? {
                state = next;
            }
        }
        Ok(state)
    }

    fn apply(
        &self,
        id: OperationId,
        info: &EphemeralInfo,
        action: Action,
    ) -> PushResult<Option<OperationState>> {
        match action {
            Action::Upload | Action::Poll => Ok(None),
            Action::RecordSuccess(domain) => {
                info.record_success(domain)?;
                Ok(None)
            }
            Action::RecordFailure { domain, status } => {
                let failures = info.record_failure(domain, status)?;
                match self.policy.evaluate(&info.counters(), domain) {
                    Verdict::Retry => {
                        debug!(operation_id = %id, %domain, failures, ?status, "scheduling retry");
                        let state = self.report(id, Event::RetryScheduled)?;
                        self.queue().push_back(id);
                        Ok(Some(state))
                    }
                    Verdict::Escalate(reason) => {
                        let state = self.report(id, Event::Escalate { reason })?;
                        Ok(Some(state))
                    }
                }
            }
            Action::RequestPull => {
                info.set_resolve_by_pulling(true);
                info!(operation_id = %id, "conflict detected, waiting for a pull");
                Ok(None)
            }
            Action::NotifyEscalation(reason) => {
                let counters = info.counters();
                warn!(
                    operation_id = %id,
                    ?reason,
                    cycles = counters.cycles(),
                    "operation escalated"
                );
                Ok(None)
            }
            Action::Finish => {
                self.ops.remove(&id);
                let duplicates = info.take_duplicates();
                for duplicate in &duplicates {
                    self.ops.remove(duplicate);
                }
                info!(operation_id = %id, duplicates = duplicates.len(), "operation completed");
                Ok(None)
            }
            Action::Discard => {
                self.ops.remove(&id);
                let duplicates = info.take_duplicates();
                let mut queue = self.queue();
                queue.retain(|queued| queued != &id);
                queue.extend(duplicates.iter().copied());
                info!(operation_id = %id, released = duplicates.len(), "operation discarded");
                Ok(None)
            }
        }
    }

    /// A pull ran for an operation waiting on one; queue it again.
    pub fn pull_completed(&self, id: OperationId) -> PushResult<OperationState> {
        let state = self.report(id, Event::PullCompleted)?;
        if state == OperationState::Pending {
            if let Some(info) = self.info(&id) {
                info.set_resolve_by_pulling(false);
            }
            self.queue().push_back(id);
        }
        Ok(state)
    }

    /// The user resolved an escalated operation; retry it from zero.
    pub fn clear_escalation(&self, id: OperationId) -> PushResult<OperationState> {
        let info = self.info(&id).ok_or(PushError::UnknownOperation(id))?;
        if !matches!(self.state(&id), Some(OperationState::Escalated { .. })) {
            return self.state(&id).ok_or(PushError::UnknownOperation(id));
        }
        info.reset_counters()?;
        let state = self.report(id, Event::EscalationCleared)?;
        self.queue().push_back(id);
        Ok(state)
    }

    /// Abort an operation. Returns `false` if it is unknown or was
    /// already aborted.
    pub fn abort(&self, id: OperationId) -> bool {
        let Some(info) = self.info(&id) else {
            return false;
        };
        if !info.request_abort() {
            return false;
        }
        match self.report(id, Event::AbortRequested) {
            Ok(_) => true,
            Err(err) => {
                warn!(operation_id = %id, error = %err, "abort failed");
                false
            }
        }
    }

    /// Abort every operation of a local user. Returns how many were aborted.
    pub fn abort_for_user(&self, user: &UserId) -> usize {
        let ids: Vec<OperationId> = self
            .ops
            .iter()
            .filter(|entry| &entry.operation.local_user_id == user)
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter(|id| self.abort(*id)).count()
    }

    /// Escalated operations and why they stopped.
    pub fn escalated(&self) -> Vec<(OperationId, Escalation)> {
        self.ops
            .iter()
            .filter_map(|entry| match entry.state {
                OperationState::Escalated { reason } => Some((*entry.key(), reason)),
                _ => None,
            })
            .collect()
    }

    /// Operations waiting for a pull.
    pub fn needs_pull(&self) -> Vec<OperationId> {
        self.ops
            .iter()
            .filter(|entry| entry.state == OperationState::NeedsPull)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Counts of tracked operations by state.
    pub fn report_counts(&self) -> PipelineReport {
        let queued: Vec<OperationId> = self.queue().iter().copied().collect();
        let mut report = PipelineReport::default();
        for entry in self.ops.iter() {
            match entry.state {
                OperationState::Pending if queued.contains(entry.key()) => report.pending += 1,
                OperationState::Pending => report.captured += 1,
                OperationState::NeedsPull => report.needs_pull += 1,
                OperationState::Escalated { .. } => report.escalated += 1,
                state if state.is_in_flight() || matches!(state, OperationState::Failed(_)) => {
                    report.in_flight += 1
                }
                _ => {}
            }
        }
        report
    }
}

impl Default for PushPipeline {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
