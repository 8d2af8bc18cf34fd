//! Outbound operation state machine.
//!
//! A pure, side-effect-free state machine for one queued cloud operation.
//! It takes events reported by the push engine and produces a new state
//! plus a list of actions to execute. Counting failures and deciding when
//! to stop retrying happen outside, in [`PhaseCounters`](crate::PhaseCounters)
//! and [`RetryPolicy`](crate::RetryPolicy).

use serde::{Deserialize, Serialize};

use crate::phase::FailureDomain;
use crate::retry::Escalation;

/// Work currently on the wire or on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Object-storage upload.
    Transport,
    /// Server-side processing of the uploaded object.
    Processing,
}

/// Lifecycle of one operation - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Queued, waiting for the scheduler.
    Pending,
    /// Dispatched and in progress.
    InFlight(Phase),
    /// Uploaded, waiting for the server to acknowledge the object.
    AwaitingNotification,
    /// The last attempt failed in this domain; waiting for a retry decision.
    Failed(FailureDomain),
    /// Retrying cannot fix this; a pull must run first.
    NeedsPull,
    /// Taken out of the retry cycle, surfaced as a conflict.
    Escalated {
        /// Why retries stopped.
        reason: Escalation,
    },
    /// Done.
    Completed,
    /// Cancelled by request.
    Aborted,
}

impl OperationState {
    /// A new operation starts pending.
    pub fn new() -> Self {
        Self::Pending
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// Events that make no sense in the current state leave it unchanged
    /// and produce no actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Terminal
            (Self::Completed, _) | (Self::Aborted, _) => (self, vec![]),

            (_, Event::AbortRequested) => (Self::Aborted, vec![Action::Discard]),
            (
                Self::Pending | Self::InFlight(_) | Self::AwaitingNotification | Self::Failed(_),
                Event::ConflictDetected,
            ) => (Self::NeedsPull, vec![Action::RequestPull]),

            // From Pending
            (Self::Pending, Event::Dispatched) => {
                (Self::InFlight(Phase::Transport), vec![Action::Upload])
            }

            // From InFlight(Transport)
            (Self::InFlight(Phase::Transport), Event::UploadSucceeded) => (
                Self::AwaitingNotification,
                vec![
                    Action::RecordSuccess(FailureDomain::Transport),
                    Action::Poll,
                ],
            ),
            (Self::InFlight(Phase::Transport), Event::UploadFailed { status }) => (
                Self::Failed(FailureDomain::Transport),
                vec![Action::RecordFailure {
                    domain: FailureDomain::Transport,
                    status,
                }],
            ),

            // From AwaitingNotification
            (Self::AwaitingNotification, Event::NotificationReceived) => (
                Self::InFlight(Phase::Processing),
                vec![Action::RecordSuccess(FailureDomain::Notification)],
            ),
            (Self::AwaitingNotification, Event::NotificationTimedOut) => (
                Self::Failed(FailureDomain::Notification),
                vec![Action::RecordFailure {
                    domain: FailureDomain::Notification,
                    status: None,
                }],
            ),

            // From InFlight(Processing)
            (Self::InFlight(Phase::Processing), Event::ProcessingAccepted) => (
                Self::Completed,
                vec![
                    Action::RecordSuccess(FailureDomain::Processing),
                    Action::Finish,
                ],
            ),
            (Self::InFlight(Phase::Processing), Event::ProcessingRejected { code }) => (
                Self::Failed(FailureDomain::Processing),
                vec![Action::RecordFailure {
                    domain: FailureDomain::Processing,
                    status: Some(code),
                }],
            ),

            // From Failed
            (Self::Failed(_), Event::RetryScheduled) => (Self::Pending, vec![]),
            (Self::Failed(_), Event::Escalate { reason }) => (
                Self::Escalated { reason },
                vec![Action::NotifyEscalation(reason)],
            ),

            // From NeedsPull / Escalated
            (Self::NeedsPull, Event::PullCompleted) => (Self::Pending, vec![]),
            (Self::Escalated { .. }, Event::EscalationCleared) => (Self::Pending, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Completed or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Dispatched and not yet resolved.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight(_) | Self::AwaitingNotification)
    }
}

impl Default for OperationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Things that happen to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The scheduler picked the operation up.
    Dispatched,
    /// Object storage accepted the upload.
    UploadSucceeded,
    /// Object storage rejected the upload.
    UploadFailed {
        /// HTTP status, if the request got that far.
        status: Option<u32>,
    },
    /// The server acknowledged the uploaded object.
    NotificationReceived,
    /// No acknowledgement arrived in time.
    NotificationTimedOut,
    /// The server accepted the object.
    ProcessingAccepted,
    /// The server rejected the object.
    ProcessingRejected {
        /// Extended status code.
        code: u32,
    },
    /// Local and server state disagree in a way a retry cannot fix.
    ConflictDetected,
    /// The retry policy allowed another attempt.
    RetryScheduled,
    /// A pull ran after `ConflictDetected`.
    PullCompleted,
    /// The retry policy gave up.
    Escalate {
        /// Why.
        reason: Escalation,
    },
    /// The user resolved an escalated conflict.
    EscalationCleared,
    /// Cancel the operation.
    AbortRequested,
}

/// Instructions for the push engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Upload the operation's objects.
    Upload,
    /// Poll for the server acknowledgement.
    Poll,
    /// Reset the failure counter of a domain.
    RecordSuccess(FailureDomain),
    /// Count a failure in a domain.
    RecordFailure {
        /// Domain that failed.
        domain: FailureDomain,
        /// Status to remember, if any.
        status: Option<u32>,
    },
    /// Schedule a pull before retrying.
    RequestPull,
    /// Surface the operation as a conflict.
    NotifyEscalation(Escalation),
    /// Apply the operation's local effects and drop it from the queue.
    Finish,
    /// Drop the operation and ignore results of calls still in flight.
    Discard,
}
