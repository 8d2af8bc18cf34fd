//! # tree-push
//!
//! Outbound push pipeline for 0k-Tree.
//!
//! Local changes to the node graph become queued [`CloudOperation`]s. The
//! engine uploads each one, waits for the server's verdict and records the
//! result locally.
//!
//! ## Features
//!
//! - **Duplicate Capture**: a dispatched put absorbs later puts of the same node
//! - **Per-Domain Failure Counting**: transport, notification and processing
//!   failures are counted separately, so a flaky upload never masks a
//!   server-side rejection
//! - **Escalation**: operations that keep failing leave the retry cycle
//! - **Transport Abstraction**: pluggable transport layer (mock included)
//! - **Pure State Machine**: uses tree-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use tree_push::{CloudOperation, MockTransport, PushConfig, PushEngine, StaticCredentialProvider};
//!
//! let engine = PushEngine::new(db, &PushConfig::default(), TreeConfig::default(), MockTransport::new(), credentials);
//! engine.enqueue(CloudOperation::put(user, tree, node_id, None));
//! let summary = engine.run_until_idle().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod credentials;
pub mod engine;
pub mod ephemeral;
pub mod error;
pub mod operation;
pub mod pipeline;
pub mod rcrd;
pub mod transport;

pub use config::PushConfig;
pub use credentials::{
    CachingCredentialProvider, CredentialError, CredentialProvider, StaticCredentialProvider,
    StorageCredentials,
};
pub use engine::{PushEngine, PushSummary};
pub use ephemeral::{EphemeralInfo, PartialUpload};
pub use error::{PushError, PushResult};
pub use operation::{CloudOperation, OperationKind, PutContent};
pub use pipeline::{Dispatch, PipelineReport, PushPipeline};
pub use rcrd::{RecordDocument, RecordPayload, RCRD_VERSION};
pub use transport::{
    ConflictReason, MockTransport, PollOutcome, RequestBody, Transport, TransportError,
    UploadOutcome, UploadRequest,
};
