use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::messages::{error::OcppError, Call};

/// Errors that can occur during queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue holds `capacity` elements already
    #[error("Request queue is full (capacity {capacity}). Wait for pending requests to complete before sending more")]
    QueueFull { capacity: usize },
}

/// Invoked with the reason a queued request never got its answer
pub type RequestCallback = Arc<dyn Fn(OcppError) + Send + Sync>;

/// An outbound Call waiting for its turn, together with its wire bytes
#[derive(Clone)]
pub struct RequestBundle {
    pub call: Call,
    pub data: Vec<u8>,
    pub callback: Option<RequestCallback>,
    pub cancellation: Option<CancellationToken>,
}

impl RequestBundle {
    pub fn new(call: Call, data: Vec<u8>) -> Self {
        Self {
            call,
            data,
            callback: None,
            cancellation: None,
        }
    }

    pub fn with_callback(mut self, callback: RequestCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn id(&self) -> &str {
        &self.call.unique_id
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    /// Notifies the bundle owner, if it asked to be notified
    pub fn notify_canceled(&self, error: OcppError) {
        if let Some(callback) = &self.callback {
            callback(error);
        }
    }
}

impl fmt::Debug for RequestBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBundle")
            .field("id", &self.call.unique_id)
            .field("action", &self.call.action)
            .field("bytes", &self.data.len())
            .field("callback", &self.callback.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

/// Bounded FIFO of outbound requests for one peer.
///
/// A capacity of 0 means unbounded. A rejected push leaves the queue intact.
pub struct RequestQueue {
    capacity: usize,
    elements: Mutex<VecDeque<RequestBundle>>,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            elements: Mutex::new(VecDeque::new()),
        }
    }

    pub fn init(&self) {
        self.elements.lock().clear();
    }

    pub fn push(&self, bundle: RequestBundle) -> Result<(), QueueError> {
        let mut elements = self.elements.lock();
        if self.capacity > 0 && elements.len() >= self.capacity {
            return Err(QueueError::QueueFull {
                capacity: self.capacity,
            });
        }
        elements.push_back(bundle);
        Ok(())
    }

    pub fn peek(&self) -> Option<RequestBundle> {
        self.elements.lock().front().cloned()
    }

    pub fn pop(&self) -> Option<RequestBundle> {
        self.elements.lock().pop_front()
    }

    /// Pops the head only if its id matches, atomically
    pub fn pop_if_head(&self, id: &str) -> Option<RequestBundle> {
        let mut elements = self.elements.lock();
        match elements.front() {
            Some(head) if head.id() == id => elements.pop_front(),
            _ => None,
        }
    }

    pub fn head_id(&self) -> Option<String> {
        self.elements.lock().front().map(|head| head.id().to_string())
    }

    pub fn size(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.size() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}
