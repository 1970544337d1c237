use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use ocppj_shared::RequestQueue;

/// One outbound [`RequestQueue`] per connected client
pub struct QueueMap {
    capacity: usize,
    queues: Mutex<HashMap<String, Arc<RequestQueue>>>,
}

impl QueueMap {
    /// Queues created by this map hold at most `capacity` requests
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn init(&self) {
        self.queues.lock().clear();
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<RequestQueue>> {
        self.queues.lock().get(client_id).cloned()
    }

    pub fn get_or_create(&self, client_id: &str) -> Arc<RequestQueue> {
        let capacity = self.capacity;
        self.queues
            .lock()
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(RequestQueue::new(capacity)))
            .clone()
    }

    pub fn add(&self, client_id: &str, queue: RequestQueue) {
        self.queues
            .lock()
            .insert(client_id.to_string(), Arc::new(queue));
    }

    pub fn remove(&self, client_id: &str) -> Option<Arc<RequestQueue>> {
        self.queues.lock().remove(client_id)
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
