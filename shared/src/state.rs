use std::{fmt, sync::Arc, time::Instant};

use parking_lot::Mutex;

use crate::messages::payload::Request;

/// An outbound Call that has been handed to the link and not yet answered
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: String,
    pub request: Arc<dyn Request>,
    pub started_at: Instant,
}

/// Outstanding-request bookkeeping for a single peer.
///
/// Holds at most one pending request, matching the protocol rule that only
/// one Call may be unanswered per peer at any time.
#[derive(Default)]
pub struct ClientState {
    pending: Mutex<Option<PendingRequest>>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending request. No-op if the id is empty or another request
    /// is already pending.
    pub fn add_pending_request(&self, id: &str, request: Arc<dyn Request>) {
        if id.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return;
        }
        *pending = Some(PendingRequest {
            id: id.to_string(),
            request,
            started_at: Instant::now(),
        });
    }

    pub fn get_pending_request(&self, id: &str) -> Option<Arc<dyn Request>> {
        let pending = self.pending.lock();
        match pending.as_ref() {
            Some(entry) if entry.id == id => Some(entry.request.clone()),
            _ => None,
        }
    }

    /// Removes the pending request if its id matches
    pub fn delete_pending_request(&self, id: &str) -> Option<PendingRequest> {
        let mut pending = self.pending.lock();
        match pending.as_ref() {
            Some(entry) if entry.id == id => pending.take(),
            _ => None,
        }
    }

    pub fn clear_pending_requests(&self) {
        self.pending.lock().take();
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn pending_request_id(&self) -> Option<String> {
        self.pending.lock().as_ref().map(|entry| entry.id.clone())
    }

    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.pending.lock().clone()
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientState")
            .field("pending", &self.pending_request_id())
            .finish()
    }
}
