//! Push pending changes through a simulated server.
//!
//! Every node without a cloudID is uploaded and every pending delete is
//! sent, using the in-process mock transport. Faults can be injected to
//! watch the retry and escalation behavior.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tree_core::Escalation;
use tree_push::{
    CachingCredentialProvider, CloudOperation, MockTransport, PollOutcome, PushEngine,
    PushSummary, StaticCredentialProvider, TransportError,
};
use tree_store::Database;
use tree_types::{NodeId, OperationId, Trunk};

use super::Session;
use crate::config::Config;

/// Lifetime of the simulated storage credentials.
const CREDENTIAL_TTL_SECS: u64 = 3600;

/// Status code the simulated server rejects objects with.
const SIMULATED_REJECTION: u32 = 500;

/// Failures to inject before the simulated server behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// Uploads that fail with a connection error.
    pub fail_uploads: u32,
    /// Uploaded objects the server rejects.
    pub reject: u32,
}

/// What a push did.
#[derive(Debug, Clone)]
pub struct PushReport {
    /// Uploads queued.
    pub puts: usize,
    /// Deletes queued.
    pub deletes: usize,
    /// Engine totals.
    pub summary: PushSummary,
    /// Operations that left the retry cycle.
    pub escalated: Vec<(OperationId, Escalation)>,
}

/// Run the push command.
pub async fn run(data_dir: &Path, config: Config, faults: Faults) -> Result<()> {
    let session = Session::open(data_dir, config).await?;
    let report = push(&session, faults).await?;

    println!("Queued {} upload(s) and {} delete(s)", report.puts, report.deletes);
    if report.summary.attempts == 0 {
        println!("Nothing to push.");
        return Ok(());
    }
    println!();
    println!("  Attempts:   {}", report.summary.attempts);
    println!("  Completed:  {}", report.summary.completed);
    println!("  Escalated:  {}", report.summary.escalated);
    println!("  Needs pull: {}", report.summary.needs_pull);
    for (id, reason) in &report.escalated {
        println!("    {} {}", id, describe_escalation(reason));
    }
    Ok(())
}

/// Queue and run every pending change of the profile's tree.
pub async fn push(session: &Session, faults: Faults) -> Result<PushReport> {
    let user = session.profile.user_id.clone();
    let tree = session.profile.tree_id.clone();

    let credentials = CachingCredentialProvider::new(
        StaticCredentialProvider::new([(
            user.clone(),
            StaticCredentialProvider::issue(&user, CREDENTIAL_TTL_SECS),
        )]),
        session.config.push.credential_refresh_margin_secs,
    );
    let transport = MockTransport::new();
    for _ in 0..faults.fail_uploads {
        transport.fail_next_upload(TransportError::ConnectionFailed("simulated outage".into()));
    }
    for _ in 0..faults.reject {
        transport.queue_poll(PollOutcome::Rejected {
            code: SIMULATED_REJECTION,
        });
    }

    let engine = PushEngine::new(
        Arc::clone(&session.db),
        &session.config.push,
        session.config.tree.clone(),
        transport,
        credentials,
    );

    let pending = not_uploaded(session)?;
    for node_id in &pending {
        engine.enqueue(CloudOperation::put(user.clone(), tree.clone(), *node_id, None));
    }
    let deletes = engine.enqueue_pending_deletes(&user, &tree)?;
    info!(
        puts = pending.len(),
        deletes,
        fail_uploads = faults.fail_uploads,
        reject = faults.reject,
        "starting simulated push"
    );

    let summary = engine.run_until_idle().await?;
    Ok(PushReport {
        puts: pending.len(),
        deletes,
        summary,
        escalated: engine.pipeline().escalated(),
    })
}

/// Nodes without a cloudID, parents before children.
fn not_uploaded(session: &Session) -> Result<Vec<NodeId>> {
    let txn = session.db.begin_read()?;
    let manager = session.store.manager();
    let mut out = Vec::new();
    for trunk in Trunk::ALL {
        let Some(root) = manager.trunk_node_for(
            &session.profile.user_id,
            &session.profile.tree_id,
            trunk,
            &txn,
        )?
        else {
            continue;
        };
        for item in manager.descendants(&root.id, &txn)? {
            let node = item?.node;
            if node.cloud_id().is_none() {
                out.push(node.id);
            }
        }
    }
    Ok(out)
}

fn describe_escalation(reason: &Escalation) -> String {
    match reason {
        Escalation::Threshold(domain) => format!("too many {} failures", domain),
        Escalation::Loop => "keeps failing after upload".to_string(),
    }
}
