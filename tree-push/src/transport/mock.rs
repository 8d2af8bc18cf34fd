//! Mock transport for testing.
//!
//! Allows scripting outcomes and capturing sent requests for verification.

use super::{PollOutcome, Transport, TransportError, UploadOutcome, UploadRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tree_types::CloudId;

/// Mock transport for testing.
///
/// Scripted outcomes are returned first, in order. Without a script, every
/// upload completes and every poll reports the request as processed, with
/// a stable cloudID per node.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    uploads: Vec<UploadRequest>,
    polls: Vec<String>,
    upload_script: VecDeque<Result<UploadOutcome, TransportError>>,
    poll_script: VecDeque<Result<PollOutcome, TransportError>>,
    requests: HashMap<String, Option<CloudId>>,
    next_request: u64,
    next_cloud_id: u64,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `outcome` from a future `upload()`.
    pub fn queue_upload(&self, outcome: UploadOutcome) {
        let mut inner = self.inner.lock().unwrap();
        inner.upload_script.push_back(Ok(outcome));
    }

    /// Return `outcome` from a future `poll()`.
    pub fn queue_poll(&self, outcome: PollOutcome) {
        let mut inner = self.inner.lock().unwrap();
        inner.poll_script.push_back(Ok(outcome));
    }

    /// Cause the next upload() to fail with the given error.
    pub fn fail_next_upload(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.upload_script.push_front(Err(error));
    }

    /// Cause the next poll() to fail with the given error.
    pub fn fail_next_poll(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.poll_script.push_front(Err(error));
    }

    /// Get all requests that were uploaded.
    pub fn uploads(&self) -> Vec<UploadRequest> {
        let inner = self.inner.lock().unwrap();
        inner.uploads.clone()
    }

    /// Get the last request that was uploaded.
    pub fn last_upload(&self) -> Option<UploadRequest> {
        let inner = self.inner.lock().unwrap();
        inner.uploads.last().cloned()
    }

    /// Get every polled request id.
    pub fn polls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.polls.clone()
    }

    /// Clear all state (requests, scripts, counters).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let cloud_id = request.cloud_id.clone();
        inner.uploads.push(request);

        let outcome = match inner.upload_script.pop_front() {
            Some(scripted) => scripted?,
            None => {
                inner.next_request += 1;
                UploadOutcome::Complete {
                    request_id: format!("req-{}", inner.next_request),
                }
            }
        };
        if let UploadOutcome::Complete { request_id } = &outcome {
            inner.requests.insert(request_id.clone(), cloud_id);
        }
        Ok(outcome)
    }

    async fn poll(&self, request_id: &str) -> Result<PollOutcome, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.polls.push(request_id.to_string());

        if let Some(scripted) = inner.poll_script.pop_front() {
            return scripted;
        }
        let known = inner.requests.get(request_id).cloned();
        match known {
            Some(existing) => {
                let cloud_id = match existing {
                    Some(cloud_id) => cloud_id,
                    None => {
                        inner.next_cloud_id += 1;
                        CloudId::new(format!("cid-{}", inner.next_cloud_id))
                    }
                };
                Ok(PollOutcome::Processed {
                    cloud_id,
                    change_token: format!("tok-{}", request_id),
                })
            }
            None => Err(TransportError::Http {
                status: 404,
                message: format!("unknown request {}", request_id),
            }),
        }
    }
}
