//! The async push engine.
//!
//! Runs queued operations one attempt at a time: credentials, upload, poll,
//! then the local write that records the server's verdict. Every outcome is
//! reported to the [`PushPipeline`], which decides whether to retry.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tree_core::{next_available_name, CloudNodeManager, Event, NodeStore, OperationState, TreeConfig};
use tree_store::{Database, ReadWriteTransaction};
use tree_types::{
    CloudFileExtension, CloudId, CloudLocator, CloudNode, CloudNodeState, NodeId,
    NormalizedName, OperationId, TreeError, TreeId, UserId,
};

use crate::config::PushConfig;
use crate::credentials::{CredentialProvider, StorageCredentials};
use crate::ephemeral::{EphemeralInfo, PartialUpload};
use crate::error::{PushError, PushResult};
use crate::operation::{CloudOperation, OperationKind};
use crate::pipeline::{Dispatch, PushPipeline};
use crate::rcrd::RecordDocument;
use crate::transport::{
    ConflictReason, PollOutcome, RequestBody, Transport, UploadOutcome, UploadRequest,
};

/// Totals of a [`PushEngine::run_until_idle`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Attempts made.
    pub attempts: usize,
    /// Operations completed.
    pub completed: usize,
    /// Operations escalated.
    pub escalated: usize,
    /// Operations waiting for a pull.
    pub needs_pull: usize,
    /// Operations aborted.
    pub aborted: usize,
}

/// Drives queued operations against a [`Transport`].
pub struct PushEngine<D: Database, T: Transport, C: CredentialProvider> {
    db: Arc<D>,
    store: NodeStore,
    clouds: CloudNodeManager,
    pipeline: PushPipeline,
    transport: T,
    credentials: C,
    poll_timeout: Duration,
    change_tokens: DashMap<NodeId, String>,
}

impl<D: Database, T: Transport, C: CredentialProvider> PushEngine<D, T, C> {
    /// Create an engine over `db`.
    pub fn new(
        db: Arc<D>,
        config: &PushConfig,
        tree_config: TreeConfig,
        transport: T,
        credentials: C,
    ) -> Self {
        Self {
            db,
            store: NodeStore::new(tree_config.clone()),
            clouds: CloudNodeManager::new(tree_config),
            pipeline: PushPipeline::new(config.retry.clone()),
            transport,
            credentials,
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            change_tokens: DashMap::new(),
        }
    }

    /// The operation queue.
    pub fn pipeline(&self) -> &PushPipeline {
        &self.pipeline
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queue an operation.
    pub fn enqueue(&self, operation: CloudOperation) -> OperationId {
        self.pipeline.enqueue(operation)
    }

    /// Queue a delete for every pending-delete shadow record of `user` in
    /// `tree` that is not queued yet. Returns how many were queued.
    pub fn enqueue_pending_deletes(&self, user: &UserId, tree: &TreeId) -> PushResult<usize> {
        let txn = self.db.begin_read()?;
        let mut queued = 0;
        for id in self.clouds.all_cloud_node_ids(user, &txn)? {
            let Some(shadow) = self.clouds.cloud_node(&id, &txn)? else {
                continue;
            };
            if &shadow.tree_id != tree || shadow.state != CloudNodeState::PendingDelete {
                continue;
            }
            let already_queued = self.pipeline.contains(|op| {
                matches!(&op.kind, OperationKind::Delete { cloud_node_id } if *cloud_node_id == id)
            });
            if already_queued {
                continue;
            }
            self.pipeline
                .enqueue(CloudOperation::delete(user.clone(), tree.clone(), id));
            queued += 1;
        }
        if queued > 0 {
            info!(user_id = %user, tree_id = %tree, queued, "queued pending deletes");
        }
        Ok(queued)
    }

    /// A pull ran for an operation in `NeedsPull`. `change_token` is the
    /// node's token as of the pull, if it has one.
    pub fn pull_completed(
        &self,
        id: OperationId,
        change_token: Option<String>,
    ) -> PushResult<OperationState> {
        if let (Some(token), Some(node_id)) = (
            change_token,
            self.pipeline.operation(&id).and_then(|op| op.node_id()),
        ) {
            self.change_tokens.insert(node_id, token);
        }
        self.pipeline.pull_completed(id)
    }

    /// Run every queued operation until the queue is empty.
    pub async fn run_until_idle(&self) -> PushResult<PushSummary> {
        let mut summary = PushSummary::default();
        while let Some((_, state)) = self.run_next().await? {
            summary.attempts += 1;
            match state {
                OperationState::Completed => summary.completed += 1,
                OperationState::Escalated { .. } => summary.escalated += 1,
                OperationState::NeedsPull => summary.needs_pull += 1,
                OperationState::Aborted => summary.aborted += 1,
                _ => {}
            }
        }
        debug!(?summary, "push queue idle");
        Ok(summary)
    }

    /// Make one attempt at the next queued operation.
    ///
    /// Returns `None` when nothing is queued. An operation that fails with
    /// a local error is aborted and the error returned.
    pub async fn run_next(&self) -> PushResult<Option<(OperationId, OperationState)>> {
        let Some(Dispatch { operation, info }) = self.pipeline.dispatch_next() else {
            return Ok(None);
        };
        debug!(operation_id = %operation.id, kind = ?operation.kind, "dispatched operation");

        match self.attempt(&operation, &info).await {
            Ok(state) => Ok(Some((operation.id, state))),
            Err(err) => {
                error!(operation_id = %operation.id, error = %err, "operation failed locally, aborting");
                self.pipeline.abort(operation.id);
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        operation: &CloudOperation,
        info: &EphemeralInfo,
    ) -> PushResult<OperationState> {
        if let Some(node_id) = operation.node_id() {
            if let Some(token) = self.change_tokens.get(&node_id) {
                info.set_last_change_token(Some(token.value().clone()));
            }
        }

        let credentials = match self
            .credentials
            .credentials_for(&operation.local_user_id)
            .await
        {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(operation_id = %operation.id, error = %err, "no storage credentials");
                return self.report(info, Event::UploadFailed { status: None });
            }
        };
        if info.is_aborted() {
            return Ok(OperationState::Aborted);
        }

        let requests = match self.build_requests(operation, info, &credentials) {
            Ok(requests) => requests,
            Err(PushError::Tree(err)) if err.is_not_found() => {
                warn!(operation_id = %operation.id, error = %err, "operation target is gone, aborting");
                self.pipeline.abort(operation.id);
                return Ok(OperationState::Aborted);
            }
            Err(err) => return Err(err),
        };

        // The first request carries the record the server processes.
        let Some(locator) = requests.first().map(|r| r.locator.clone()) else {
            return Err(PushError::Serialization(format!(
                "operation {} produced no requests",
                operation.id
            )));
        };
        let mut poll_id = None;
        for request in requests {
            let object = match &request.body {
                RequestBody::Put { ext, bytes } => Some((*ext, bytes.clone())),
                _ => None,
            };
            let outcome = self.transport.upload(request).await;
            if info.is_aborted() {
                return Ok(OperationState::Aborted);
            }
            match outcome {
                Ok(UploadOutcome::Complete { request_id }) => {
                    if let Some((ext, _)) = object {
                        info.set_partial_upload(ext, None);
                    }
                    poll_id.get_or_insert(request_id);
                }
                Ok(UploadOutcome::Partial { continuation }) => {
                    if let Some((ext, bytes)) = object {
                        info.set_partial_upload(
                            ext,
                            Some(PartialUpload {
                                continuation,
                                bytes,
                            }),
                        );
                    }
                    return self.report(info, Event::UploadFailed { status: None });
                }
                Ok(UploadOutcome::Failed { status }) => {
                    return self.report(info, Event::UploadFailed { status: Some(status) });
                }
                Err(err) => {
                    debug!(operation_id = %operation.id, error = %err, "upload failed");
                    return self.report(info, Event::UploadFailed { status: err.status() });
                }
            }
        }
        let Some(request_id) = poll_id else {
            return Err(PushError::Serialization(format!(
                "operation {} produced no requests",
                operation.id
            )));
        };
        self.report(info, Event::UploadSucceeded)?;

        let polled = tokio::time::timeout(self.poll_timeout, self.transport.poll(&request_id)).await;
        if info.is_aborted() {
            return Ok(OperationState::Aborted);
        }
        let outcome = match polled {
            Ok(Ok(PollOutcome::Pending)) => return self.report(info, Event::NotificationTimedOut),
            Err(_) => {
                debug!(operation_id = %operation.id, timeout = ?self.poll_timeout, "no verdict in time");
                return self.report(info, Event::NotificationTimedOut);
            }
            Ok(Err(err)) => {
                debug!(operation_id = %operation.id, error = %err, "poll failed");
                return self.report(info, Event::NotificationTimedOut);
            }
            Ok(Ok(outcome)) => outcome,
        };
        self.report(info, Event::NotificationReceived)?;

        match outcome {
            PollOutcome::Processed {
                cloud_id,
                change_token,
            } => match self.apply_processed(operation, &cloud_id, &locator) {
                Ok(()) => {
                    if let Some(node_id) = operation.node_id() {
                        self.change_tokens.insert(node_id, change_token.clone());
                    }
                    info.set_last_change_token(Some(change_token));
                    self.report(info, Event::ProcessingAccepted)
                }
                Err(PushError::Tree(err @ TreeError::CloudIdReassigned { .. })) => {
                    warn!(operation_id = %operation.id, error = %err, "server reported a different cloudID");
                    self.report(info, Event::ConflictDetected)
                }
                Err(err) => Err(err),
            },
            PollOutcome::Rejected { code } => {
                self.report(info, Event::ProcessingRejected { code })
            }
            PollOutcome::Conflict(ConflictReason::NameTaken) => {
                self.rename_after_name_conflict(operation)?;
                self.report(
                    info,
                    Event::ProcessingRejected {
                        code: ConflictReason::NameTaken.ext_status(),
                    },
                )
            }
            PollOutcome::Conflict(reason) => {
                info!(operation_id = %operation.id, ?reason, "server refused write");
                self.report(info, Event::ConflictDetected)
            }
            PollOutcome::Pending => self.report(info, Event::NotificationTimedOut),
        }
    }

    fn report(&self, info: &EphemeralInfo, event: Event) -> PushResult<OperationState> {
        if info.is_aborted() {
            return Ok(OperationState::Aborted);
        }
        match self.pipeline.report(info.operation_id(), event) {
            Err(PushError::Aborted(_)) => Ok(OperationState::Aborted),
            Err(PushError::UnknownOperation(_)) if info.is_aborted() => {
                Ok(OperationState::Aborted)
            }
            other => other,
        }
    }

    fn build_requests(
        &self,
        operation: &CloudOperation,
        info: &EphemeralInfo,
        credentials: &StorageCredentials,
    ) -> PushResult<Vec<UploadRequest>> {
        let txn = self.db.begin_read()?;
        let request = |locator: CloudLocator,
                       body: RequestBody,
                       cloud_id: Option<CloudId>,
                       continuation: Option<String>| UploadRequest {
            operation_id: operation.id,
            locator,
            body,
            cloud_id,
            change_token: info.last_change_token(),
            continuation,
            credentials: credentials.clone(),
        };

        match &operation.kind {
            OperationKind::Put { node_id, content } => {
                let node = self.store.require_node(node_id, &txn)?;
                let locator = self.store.cloud_locator_for_node(&node, &txn)?;

                let (body, continuation) = prepared(info, CloudFileExtension::Rcrd, || {
                    RecordDocument::for_node(&node)?.to_bytes()
                })?;
                let mut requests = vec![request(
                    locator.clone(),
                    body,
                    node.cloud_id().cloned(),
                    continuation,
                )];
                if let Some(content) = content {
                    let (body, continuation) = prepared(info, CloudFileExtension::Data, || {
                        let sealed = tree_content::seal_data(
                            &node.encryption_key,
                            &content.metadata,
                            &content.thumbnail,
                            &content.data,
                        )?;
                        Ok(sealed.encode())
                    })?;
                    requests.push(request(
                        locator,
                        body,
                        node.cloud_id().cloned(),
                        continuation,
                    ));
                }
                Ok(requests)
            }
            OperationKind::Move { node_id, from } => {
                let node = self.store.require_node(node_id, &txn)?;
                let locator = self.store.cloud_locator_for_node(&node, &txn)?;
                Ok(vec![request(
                    locator,
                    RequestBody::MoveFrom(from.clone()),
                    node.cloud_id().cloned(),
                    None,
                )])
            }
            OperationKind::Delete { cloud_node_id } => {
                let shadow = self
                    .clouds
                    .cloud_node(cloud_node_id, &txn)?
                    .ok_or_else(|| TreeError::not_found("cloud node", cloud_node_id))?;
                Ok(vec![request(
                    shadow.locator,
                    RequestBody::Delete,
                    shadow.cloud_id,
                    None,
                )])
            }
        }
    }

    fn apply_processed(
        &self,
        operation: &CloudOperation,
        cloud_id: &CloudId,
        locator: &CloudLocator,
    ) -> PushResult<()> {
        let mut txn = self.db.begin_read_write()?;
        match &operation.kind {
            OperationKind::Put { node_id, .. } | OperationKind::Move { node_id, .. } => {
                match self.store.set_cloud_id(node_id, cloud_id.clone(), &mut txn) {
                    Ok(_) => {}
                    Err(err) if err.is_not_found() => {
                        self.orphaned_upload(operation, cloud_id, locator, &mut txn)?;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            OperationKind::Delete { cloud_node_id } => {
                self.store.remove_cloud_node(cloud_node_id, &mut txn)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// The node was deleted while its upload was in flight. The server
    /// object it created gets a pending-delete shadow record.
    fn orphaned_upload(
        &self,
        operation: &CloudOperation,
        cloud_id: &CloudId,
        locator: &CloudLocator,
        txn: &mut D::Write<'_>,
    ) -> PushResult<()> {
        let known = self.clouds.find_cloud_node_with_cloud_id(
            cloud_id,
            &operation.local_user_id,
            &operation.tree_id,
            &*txn,
        )?;
        if known.is_some() {
            debug!(operation_id = %operation.id, %cloud_id, "orphaned upload already awaits a delete");
            return Ok(());
        }

        let shadow = CloudNode::new(
            operation.local_user_id.clone(),
            operation.tree_id.clone(),
            locator.clone(),
            CloudNodeState::PendingDelete,
        )
        .with_cloud_id(cloud_id.clone());
        self.store.insert_cloud_node(&shadow, txn)?;
        info!(
            operation_id = %operation.id,
            %cloud_id,
            cloud_node_id = %shadow.id,
            "node deleted during upload, server object marked for delete"
        );
        Ok(())
    }

    fn rename_after_name_conflict(&self, operation: &CloudOperation) -> PushResult<()> {
        let Some(node_id) = operation.node_id() else {
            return Ok(());
        };
        let mut txn = self.db.begin_read_write()?;
        let Some(node) = self.store.node(&node_id, &txn)? else {
            return Ok(());
        };
        let Some(parent_id) = node.parent_id else {
            return Ok(());
        };

        // The server holds a node under the current name that we do not
        // know about yet.
        let current = NormalizedName::new(&node.name);
        let manager = self.store.manager();
        let name = next_available_name(&node.name, |candidate| {
            Ok(NormalizedName::new(candidate) == current
                || manager
                    .find_node_with_name(candidate, &parent_id, &txn)?
                    .is_some())
        })?;

        self.store.rename_node(&node_id, &name, &mut txn)?;
        txn.commit()?;
        info!(node_id = %node_id, from = %node.name, to = %name, "renamed after server name conflict");
        Ok(())
    }
}

/// Body of an object upload. An interrupted object is resumed with the
/// bytes it was cut from; otherwise it is sealed afresh.
fn prepared(
    info: &EphemeralInfo,
    ext: CloudFileExtension,
    seal: impl FnOnce() -> PushResult<Vec<u8>>,
) -> PushResult<(RequestBody, Option<String>)> {
    let (bytes, continuation) = match info.partial_upload(ext) {
        Some(partial) => (partial.bytes, Some(partial.continuation)),
        None => (seal()?, None),
    };
    Ok((RequestBody::Put { ext, bytes }, continuation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialProvider;
    use crate::operation::PutContent;
    use crate::transport::MockTransport;
    use tree_core::{Escalation, FailureDomain};
    use tree_store::MemoryDatabase;
    use tree_types::{Node, Region, Trunk, User};

    type TestEngine = PushEngine<MemoryDatabase, MockTransport, StaticCredentialProvider>;

    struct Fixture {
        db: Arc<MemoryDatabase>,
        store: NodeStore,
        user: UserId,
        tree: TreeId,
        home: NodeId,
        transport: MockTransport,
        engine: TestEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Arc::new(MemoryDatabase::new());
            let store = NodeStore::default();
            let user = UserId::new("alice");
            let tree = TreeId::new("main");
            let alice = User::local(user.clone(), "Alice", Region::EuWest1, "alice-bucket");

            let mut txn = db.begin_read_write().unwrap();
            let trunks = store.provision_local_user(&alice, &tree, &mut txn).unwrap();
            txn.commit().unwrap();
            let home = trunks
                .iter()
                .find(|n| n.trunk() == Some(Trunk::Home))
                .unwrap()
                .id;

            let transport = MockTransport::new();
            let credentials = StaticCredentialProvider::new([(
                user.clone(),
                StaticCredentialProvider::issue(&user, 3600),
            )]);
            let engine = PushEngine::new(
                Arc::clone(&db),
                &PushConfig::default(),
                TreeConfig::default(),
                transport.clone(),
                credentials,
            );
            Self {
                db,
                store,
                user,
                tree,
                home,
                transport,
                engine,
            }
        }

        fn insert(&self, name: &str) -> Node {
            let node = Node::new(self.home, name, self.user.clone(), self.tree.clone());
            let mut txn = self.db.begin_read_write().unwrap();
            self.store.insert_node(&node, &mut txn).unwrap();
            txn.commit().unwrap();
            node
        }

        fn node(&self, id: &NodeId) -> Option<Node> {
            let txn = self.db.begin_read().unwrap();
            self.store.node(id, &txn).unwrap()
        }

        fn put(&self, node_id: NodeId, content: Option<PutContent>) -> OperationId {
            self.engine.enqueue(CloudOperation::put(
                self.user.clone(),
                self.tree.clone(),
                node_id,
                content,
            ))
        }
    }

    // ===== Put Tests =====

    #[tokio::test]
    async fn put_uploads_record_then_content() {
        let fx = Fixture::new();
        let node = fx.insert("Report.pdf");
        fx.put(node.id, Some(PutContent::data(b"hello".to_vec())));

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.completed, 1);

        let uploads = fx.transport.uploads();
        assert_eq!(uploads.len(), 2);
        assert!(matches!(
            uploads[0].body,
            RequestBody::Put {
                ext: CloudFileExtension::Rcrd,
                ..
            }
        ));
        let RequestBody::Put {
            ext: CloudFileExtension::Data,
            bytes,
        } = &uploads[1].body
        else {
            panic!("expected data object, got {:?}", uploads[1].body);
        };
        assert_eq!(
            tree_content::open_data(&node.encryption_key, bytes).unwrap(),
            b"hello"
        );
        assert_eq!(uploads[0].locator.bucket, "alice-bucket");

        let stored = fx.node(&node.id).unwrap();
        assert_eq!(stored.cloud_id(), Some(&CloudId::new("cid-1")));
        assert!(fx.engine.pipeline().is_empty());
    }

    #[tokio::test]
    async fn later_put_sends_cloud_id_and_change_token() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        fx.put(node.id, None);
        fx.engine.run_until_idle().await.unwrap();

        fx.put(node.id, None);
        fx.engine.run_until_idle().await.unwrap();

        let second = fx.transport.last_upload().unwrap();
        assert_eq!(second.cloud_id, Some(CloudId::new("cid-1")));
        assert_eq!(second.change_token.as_deref(), Some("tok-req-1"));
        assert_eq!(
            fx.node(&node.id).unwrap().cloud_id(),
            Some(&CloudId::new("cid-1"))
        );
    }

    #[tokio::test]
    async fn queued_duplicates_are_captured() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        fx.put(node.id, Some(PutContent::data(b"v1".to_vec())));
        fx.put(node.id, None);
        fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 1);
        assert_eq!(fx.transport.uploads().len(), 2);
        assert!(fx.engine.pipeline().is_empty());
    }

    #[tokio::test]
    async fn partial_upload_resumes_with_continuation() {
        let fx = Fixture::new();
        let node = fx.insert("big.bin");
        fx.transport.queue_upload(UploadOutcome::Partial {
            continuation: "cont-1".into(),
        });
        fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.completed, 1);

        let uploads = fx.transport.uploads();
        assert_eq!(uploads[0].continuation, None);
        assert_eq!(uploads[1].continuation.as_deref(), Some("cont-1"));
    }

    #[tokio::test]
    async fn resumed_upload_sends_the_interrupted_bytes() {
        let fx = Fixture::new();
        let node = fx.insert("big.bin");
        fx.transport.queue_upload(UploadOutcome::Complete {
            request_id: "req-rcrd".into(),
        });
        fx.transport.queue_upload(UploadOutcome::Partial {
            continuation: "cont-d".into(),
        });
        let id = fx.put(node.id, Some(PutContent::data(b"large payload".to_vec())));

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.completed, 1);

        let data: Vec<_> = fx
            .transport
            .uploads()
            .into_iter()
            .filter(|r| {
                matches!(
                    r.body,
                    RequestBody::Put {
                        ext: CloudFileExtension::Data,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].continuation, None);
        assert_eq!(data[1].continuation.as_deref(), Some("cont-d"));
        assert_eq!(data[0].body, data[1].body);

        let RequestBody::Put { bytes, .. } = &data[1].body else {
            unreachable!();
        };
        assert_eq!(
            tree_content::open_data(&node.encryption_key, bytes).unwrap(),
            b"large payload"
        );
        if let Some(info) = fx.engine.pipeline().info(&id) {
            assert_eq!(info.partial_upload(CloudFileExtension::Data), None);
        }
    }

    // ===== Failure Tests =====

    #[tokio::test]
    async fn transport_failures_escalate_at_threshold() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        for _ in 0..5 {
            fx.transport.queue_upload(UploadOutcome::Failed { status: 503 });
        }
        let id = fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 5);
        assert_eq!(summary.escalated, 1);
        assert_eq!(
            fx.engine.pipeline().escalated(),
            vec![(id, Escalation::Threshold(FailureDomain::Transport))]
        );
        let counters = fx.engine.pipeline().info(&id).unwrap().counters();
        assert_eq!(counters.last_status(FailureDomain::Transport), Some(503));
        assert_eq!(counters.cycles(), 0);
    }

    #[tokio::test]
    async fn processing_rejections_escalate_after_three() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        for _ in 0..3 {
            fx.transport.queue_poll(PollOutcome::Rejected { code: 1017 });
        }
        let id = fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 3);
        assert_eq!(
            fx.engine.pipeline().state(&id),
            Some(OperationState::Escalated {
                reason: Escalation::Threshold(FailureDomain::Processing)
            })
        );
        assert_eq!(fx.node(&node.id).unwrap().cloud_id(), None);
    }

    #[tokio::test]
    async fn missing_credentials_count_as_transport_failures() {
        let fx = Fixture::new();
        let id = fx.engine.enqueue(CloudOperation::put(
            UserId::new("bob"),
            fx.tree.clone(),
            NodeId::new(),
            None,
        ));

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.escalated, 1);
        assert!(fx.transport.uploads().is_empty());
        assert!(matches!(
            fx.engine.pipeline().state(&id),
            Some(OperationState::Escalated { .. })
        ));
    }

    #[tokio::test]
    async fn vanished_node_aborts_operation() {
        let fx = Fixture::new();
        fx.put(NodeId::new(), None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.aborted, 1);
        assert!(fx.engine.pipeline().is_empty());
        assert!(fx.transport.uploads().is_empty());
    }

    // ===== Conflict Tests =====

    #[tokio::test]
    async fn name_taken_renames_and_retries() {
        let fx = Fixture::new();
        let node = fx.insert("Report.pdf");
        fx.transport
            .queue_poll(PollOutcome::Conflict(ConflictReason::NameTaken));
        fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.completed, 1);

        let stored = fx.node(&node.id).unwrap();
        assert_eq!(stored.name, "Report 2.pdf");
        let uploads = fx.transport.uploads();
        assert_ne!(uploads[0].locator, uploads[1].locator);
    }

    #[tokio::test]
    async fn stale_change_token_waits_for_pull() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        fx.transport
            .queue_poll(PollOutcome::Conflict(ConflictReason::StaleChangeToken));
        let id = fx.put(node.id, None);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.needs_pull, 1);
        assert_eq!(fx.engine.pipeline().needs_pull(), vec![id]);
        assert!(fx.engine.pipeline().info(&id).unwrap().resolve_by_pulling());

        let state = fx
            .engine
            .pull_completed(id, Some("tok-pulled".into()))
            .unwrap();
        assert_eq!(state, OperationState::Pending);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(
            fx.transport.last_upload().unwrap().change_token.as_deref(),
            Some("tok-pulled")
        );
    }

    // ===== Delete and Abort Tests =====

    #[tokio::test]
    async fn pending_deletes_are_pushed_once() {
        let fx = Fixture::new();
        let node = fx.insert("old.txt");
        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store
            .set_cloud_id(&node.id, CloudId::new("cid-old"), &mut txn)
            .unwrap();
        fx.store.delete_node(&node.id, &mut txn).unwrap();
        txn.commit().unwrap();

        assert_eq!(fx.engine.enqueue_pending_deletes(&fx.user, &fx.tree).unwrap(), 1);
        assert_eq!(fx.engine.enqueue_pending_deletes(&fx.user, &fx.tree).unwrap(), 0);

        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.completed, 1);

        let request = fx.transport.last_upload().unwrap();
        assert_eq!(request.body, RequestBody::Delete);
        assert_eq!(request.cloud_id, Some(CloudId::new("cid-old")));

        let txn = fx.db.begin_read().unwrap();
        assert!(CloudNodeManager::default()
            .all_cloud_node_ids(&fx.user, &txn)
            .unwrap()
            .is_empty());
    }

    /// Deletes a node locally while its upload waits for a verdict.
    struct DeleteBeforeVerdict {
        inner: MockTransport,
        db: Arc<MemoryDatabase>,
        node_id: NodeId,
    }

    #[async_trait::async_trait]
    impl Transport for DeleteBeforeVerdict {
        async fn upload(
            &self,
            request: UploadRequest,
        ) -> Result<UploadOutcome, crate::transport::TransportError> {
            self.inner.upload(request).await
        }

        async fn poll(
            &self,
            request_id: &str,
        ) -> Result<PollOutcome, crate::transport::TransportError> {
            {
                let mut txn = self.db.begin_read_write().unwrap();
                NodeStore::default().delete_node(&self.node_id, &mut txn).unwrap();
                txn.commit().unwrap();
            }
            self.inner.poll(request_id).await
        }
    }

    #[tokio::test]
    async fn node_deleted_during_upload_leaves_pending_delete() {
        let fx = Fixture::new();
        let node = fx.insert("short-lived.txt");
        let transport = DeleteBeforeVerdict {
            inner: MockTransport::new(),
            db: Arc::clone(&fx.db),
            node_id: node.id,
        };
        let engine = PushEngine::new(
            Arc::clone(&fx.db),
            &PushConfig::default(),
            TreeConfig::default(),
            transport,
            StaticCredentialProvider::new([(
                fx.user.clone(),
                StaticCredentialProvider::issue(&fx.user, 3600),
            )]),
        );
        engine.enqueue(CloudOperation::put(
            fx.user.clone(),
            fx.tree.clone(),
            node.id,
            None,
        ));

        let summary = engine.run_until_idle().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert!(fx.node(&node.id).is_none());

        let txn = fx.db.begin_read().unwrap();
        let clouds = CloudNodeManager::default();
        let shadow = clouds
            .find_cloud_node_with_cloud_id(&CloudId::new("cid-1"), &fx.user, &fx.tree, &txn)
            .unwrap()
            .unwrap();
        assert_eq!(shadow.state, CloudNodeState::PendingDelete);
        assert_eq!(shadow.locator.bucket, "alice-bucket");
        drop(txn);

        // The next pass sends the delete.
        assert_eq!(engine.enqueue_pending_deletes(&fx.user, &fx.tree).unwrap(), 1);
        let summary = engine.run_until_idle().await.unwrap();
        assert_eq!(summary.completed, 1);
        let request = engine.transport().inner.last_upload().unwrap();
        assert_eq!(request.body, RequestBody::Delete);
        assert_eq!(request.cloud_id, Some(CloudId::new("cid-1")));
    }

    #[tokio::test]
    async fn aborted_operation_is_never_sent() {
        let fx = Fixture::new();
        let node = fx.insert("notes.txt");
        let id = fx.put(node.id, None);

        assert!(fx.engine.pipeline().abort(id));
        let summary = fx.engine.run_until_idle().await.unwrap();
        assert_eq!(summary.attempts, 0);
        assert!(fx.transport.uploads().is_empty());
    }
}
