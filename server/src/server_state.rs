use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use ocppj_shared::{ClientState, Request};

/// Pending-request bookkeeping for every connected client, keyed by client id.
///
/// A client's [`ClientState`] is created on first reference and lives until
/// [`ServerState::clear_client_pending_request`] removes it.
#[derive(Default)]
pub struct ServerState {
    clients: Mutex<HashMap<String, Arc<ClientState>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending_request(&self, client_id: &str, request_id: &str, request: Arc<dyn Request>) {
        self.get_client_state(client_id)
            .add_pending_request(request_id, request);
    }

    pub fn delete_pending_request(&self, client_id: &str, request_id: &str) {
        let state = self.clients.lock().get(client_id).cloned();
        if let Some(state) = state {
            state.delete_pending_request(request_id);
        }
    }

    pub fn get_pending_request(&self, client_id: &str, request_id: &str) -> Option<Arc<dyn Request>> {
        let state = self.clients.lock().get(client_id).cloned();
        state.and_then(|state| state.get_pending_request(request_id))
    }

    /// Returns the state of a client, creating it if needed
    pub fn get_client_state(&self, client_id: &str) -> Arc<ClientState> {
        self.clients
            .lock()
            .entry(client_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the state of a client without creating it
    pub fn find_client_state(&self, client_id: &str) -> Option<Arc<ClientState>> {
        self.clients.lock().get(client_id).cloned()
    }

    pub fn has_pending_request(&self, client_id: &str) -> bool {
        self.clients
            .lock()
            .get(client_id)
            .map(|state| state.has_pending_request())
            .unwrap_or(false)
    }

    /// Whether any client has a request in flight
    pub fn has_pending_requests(&self) -> bool {
        self.clients
            .lock()
            .values()
            .any(|state| state.has_pending_request())
    }

    /// Forgets a client and its pending request
    pub fn clear_client_pending_request(&self, client_id: &str) {
        if let Some(state) = self.clients.lock().remove(client_id) {
            state.clear_pending_requests();
        }
    }

    pub fn clear_all_pending_requests(&self) {
        let mut clients = self.clients.lock();
        for state in clients.values() {
            state.clear_pending_requests();
        }
        clients.clear();
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("clients", &self.client_count())
            .finish()
    }
}
