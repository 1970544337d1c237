use std::{
    collections::HashMap,
    future::pending,
    sync::{Arc, Weak},
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;

use ocppj_shared::{DispatcherConfig, ErrorCode, OcppError, Request, RequestBundle};

use crate::{error::OcppServerError, queue_map::QueueMap, server_state::ServerState, transport::ServerLink};

/// Invoked with the client id, the request id, the original request and the
/// reason whenever an outbound request is dropped without an answer
pub type RequestCanceledHandler =
    Arc<dyn Fn(&str, &str, Arc<dyn Request>, OcppError) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Expiry {
    Timeout,
    Canceled,
}

struct Expired {
    client_id: String,
    request_id: String,
    expiry: Expiry,
}

/// Wakes the pump for a client: new work, or the client went away
struct ClientSignal {
    client_id: String,
    removed: bool,
}

struct Running {
    signals: mpsc::UnboundedSender<ClientSignal>,
    readiness: mpsc::UnboundedSender<(String, String)>,
    stop: CancellationToken,
}

/// Dispatch state of one client, owned by the pump
struct ClientSlot {
    ready: bool,
    in_flight: Option<String>,
    context: Option<CancellationToken>,
}

impl ClientSlot {
    fn new() -> Self {
        Self {
            ready: true,
            in_flight: None,
            context: None,
        }
    }

    fn cancel_context(&mut self) {
        if let Some(context) = self.context.take() {
            context.cancel();
        }
    }

    fn complete(&mut self) {
        self.cancel_context();
        self.in_flight = None;
        self.ready = true;
    }
}

/// Multi-client outbound dispatcher.
///
/// Every client has its own queue and at most one request in flight. A single
/// pump task serves all clients; each in-flight request gets a child context
/// of the pump's stop token, watched by a short-lived task that reports
/// timeouts and user cancellation back to the pump.
#[derive(Clone)]
pub struct ServerDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    queues: QueueMap,
    state: Arc<ServerState>,
    link: RwLock<Option<Arc<dyn ServerLink>>>,
    timeout: Mutex<Duration>,
    on_request_canceled: RwLock<Option<RequestCanceledHandler>>,
    running: Mutex<Option<Running>>,
}

impl ServerDispatcher {
    pub fn new(config: &DispatcherConfig, state: Arc<ServerState>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                queues: QueueMap::new(config.queue_capacity),
                state,
                link: RwLock::new(None),
                timeout: Mutex::new(config.request_timeout),
                on_request_canceled: RwLock::new(None),
                running: Mutex::new(None),
            }),
        }
    }

    /// Spawns the pump task. Must be called from within a tokio runtime
    pub fn start(&self) {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            warn!("Server dispatcher already running");
            return;
        }
        self.inner.queues.init();

        let (signals, signal_receiver) = mpsc::unbounded_channel();
        let (readiness, ready_receiver) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        tokio::spawn(pump(
            Arc::downgrade(&self.inner),
            signal_receiver,
            ready_receiver,
            stop.clone(),
        ));
        *running = Some(Running {
            signals,
            readiness,
            stop,
        });
        info!("Server dispatcher started");
    }

    /// Stops the pump, cancelling every timeout context, and discards all
    /// queues without invoking any cancellation callback
    pub fn stop(&self) {
        let running = self.inner.running.lock().take();
        let Some(running) = running else {
            return;
        };
        drop(running.signals);
        drop(running.readiness);
        running.stop.cancel();
        self.inner.queues.init();
        info!("Server dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Sets the maximum wait for a response. Affects requests dispatched
    /// from now on; `Duration::ZERO` disables timeouts
    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.lock() = timeout;
    }

    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.lock()
    }

    pub fn set_link(&self, link: Arc<dyn ServerLink>) {
        *self.inner.link.write() = Some(link);
    }

    pub fn set_on_request_canceled(&self, handler: RequestCanceledHandler) {
        *self.inner.on_request_canceled.write() = Some(handler);
    }

    // Clients

    /// Ensures a queue exists for the client. No-op while stopped
    pub fn create_client(&self, client_id: &str) {
        if self.is_running() {
            self.inner.queues.get_or_create(client_id);
            debug!("Created queue for client {}", client_id);
        }
    }

    /// Drops the client's queue. The pending-request entry in the
    /// [`ServerState`] is left to the caller
    pub fn delete_client(&self, client_id: &str) {
        self.inner.queues.remove(client_id);
        if let Some(running) = self.inner.running.lock().as_ref() {
            let _ = running.signals.send(ClientSignal {
                client_id: client_id.to_string(),
                removed: true,
            });
        }
        debug!("Deleted queue for client {}", client_id);
    }

    // Requests

    /// Enqueues a request for a client and wakes the pump
    pub fn send_request(&self, client_id: &str, bundle: RequestBundle) -> Result<(), OcppServerError> {
        let running = self.inner.running.lock();
        let Some(running) = running.as_ref() else {
            return Err(OcppServerError::NotStarted);
        };
        if self.inner.link.read().is_none() {
            return Err(OcppServerError::NotConnected);
        }
        let queue = self
            .inner
            .queues
            .get(client_id)
            .ok_or_else(|| OcppServerError::UnknownClient {
                client_id: client_id.to_string(),
            })?;
        let id = bundle.id().to_string();
        queue.push(bundle)?;
        debug!(
            "Queued request {} for client {} ({} queued)",
            id,
            client_id,
            queue.size()
        );
        let _ = running.signals.send(ClientSignal {
            client_id: client_id.to_string(),
            removed: false,
        });
        Ok(())
    }

    /// Marks the client's in-flight request as answered. The id must be the
    /// head of the client's queue, otherwise nothing changes
    pub fn complete_request(&self, client_id: &str, request_id: &str) -> bool {
        let popped = self
            .inner
            .queues
            .get(client_id)
            .and_then(|queue| queue.pop_if_head(request_id));
        match popped {
            Some(_) => {
                self.inner.state.delete_pending_request(client_id, request_id);
                self.inner.signal_ready(client_id, request_id);
                debug!("Completed request {} for client {}", request_id, client_id);
                true
            }
            None => {
                error!(
                    "Attempted to complete request {} for client {}, but it is not at the head of its queue",
                    request_id, client_id
                );
                false
            }
        }
    }

    /// Drops the client's in-flight request with the given reason
    pub fn cancel_request(&self, client_id: &str, request_id: &str, reason: OcppError) -> bool {
        if self.inner.cancel_head(client_id, request_id, reason) {
            self.inner.signal_ready(client_id, request_id);
            true
        } else {
            false
        }
    }

    pub fn queue_size(&self, client_id: &str) -> usize {
        self.inner
            .queues
            .get(client_id)
            .map(|queue| queue.size())
            .unwrap_or(0)
    }

    pub fn has_client(&self, client_id: &str) -> bool {
        self.inner.queues.get(client_id).is_some()
    }
}

impl DispatcherInner {
    fn signal_ready(&self, client_id: &str, request_id: &str) {
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running
                .readiness
                .send((client_id.to_string(), request_id.to_string()));
        }
    }

    fn cancel_head(&self, client_id: &str, request_id: &str, reason: OcppError) -> bool {
        let popped = self
            .queues
            .get(client_id)
            .and_then(|queue| queue.pop_if_head(request_id));
        match popped {
            Some(bundle) => {
                self.state.delete_pending_request(client_id, request_id);
                warn!(
                    "Request {} for client {} canceled: {}",
                    request_id, client_id, reason
                );
                self.notify_canceled(client_id, &bundle, reason);
                true
            }
            None => false,
        }
    }

    fn notify_canceled(&self, client_id: &str, bundle: &RequestBundle, reason: OcppError) {
        bundle.notify_canceled(reason.clone());
        let handler = self.on_request_canceled.read().clone();
        if let Some(handler) = handler {
            handler(client_id, bundle.id(), bundle.call.payload.clone(), reason);
        }
    }

    /// Writes the first live request of the client's queue to the link and
    /// arms its timeout context
    fn dispatch_next(
        &self,
        client_id: &str,
        slot: &mut ClientSlot,
        stop: &CancellationToken,
        expirations: &mpsc::UnboundedSender<Expired>,
    ) {
        let Some(link) = self.link.read().clone() else {
            return;
        };
        let Some(queue) = self.queues.get(client_id) else {
            return;
        };
        while let Some(bundle) = queue.peek() {
            let id = bundle.id().to_string();

            if bundle.is_canceled() {
                if let Some(bundle) = queue.pop_if_head(&id) {
                    debug!("Dropping request {} canceled before dispatch", id);
                    self.notify_canceled(
                        client_id,
                        &bundle,
                        OcppError::new(ErrorCode::GenericError, "Request canceled by user", id),
                    );
                }
                continue;
            }

            self.state
                .add_pending_request(client_id, &id, bundle.call.payload.clone());
            if let Err(err) = link.write(client_id, &bundle.data) {
                error!("Failed to write request {} to client {}: {}", id, client_id, err);
                let reason = OcppError::new(ErrorCode::InternalError, err.to_string(), id.clone());
                self.cancel_head(client_id, &id, reason);
                continue;
            }
            debug!(
                "Dispatched request {} ({}) to client {}",
                id, bundle.call.action, client_id
            );

            slot.ready = false;
            slot.in_flight = Some(id.clone());
            let timeout = *self.timeout.lock();
            if !timeout.is_zero() || bundle.cancellation.is_some() {
                let context = stop.child_token();
                tokio::spawn(watch(
                    context.clone(),
                    (!timeout.is_zero()).then_some(timeout),
                    bundle.cancellation.clone(),
                    client_id.to_string(),
                    id,
                    expirations.clone(),
                ));
                slot.context = Some(context);
            }
            return;
        }
    }
}

/// Converts the expiry of a request's timeout, or its user cancellation,
/// into a message to the pump
async fn watch(
    context: CancellationToken,
    timeout: Option<Duration>,
    user_cancellation: Option<CancellationToken>,
    client_id: String,
    request_id: String,
    expirations: mpsc::UnboundedSender<Expired>,
) {
    let expiry = tokio::select! {
        _ = context.cancelled() => return,
        _ = elapsed(timeout) => Expiry::Timeout,
        _ = canceled_by_user(user_cancellation.as_ref()) => Expiry::Canceled,
    };
    let _ = expirations.send(Expired {
        client_id,
        request_id,
        expiry,
    });
}

async fn elapsed(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => sleep(timeout).await,
        None => pending::<()>().await,
    }
}

async fn canceled_by_user(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending::<()>().await,
    }
}

async fn pump(
    inner: Weak<DispatcherInner>,
    mut signals: mpsc::UnboundedReceiver<ClientSignal>,
    mut readiness: mpsc::UnboundedReceiver<(String, String)>,
    stop: CancellationToken,
) {
    let (expirations, mut expired) = mpsc::unbounded_channel::<Expired>();
    let mut clients: HashMap<String, ClientSlot> = HashMap::new();

    loop {
        let client_id = tokio::select! {
            _ = stop.cancelled() => break,
            signal = signals.recv() => {
                let Some(ClientSignal { client_id, removed }) = signal else {
                    break;
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                // a client may reconnect before its removal is seen here
                if removed || inner.queues.get(&client_id).is_none() {
                    if let Some(mut slot) = clients.remove(&client_id) {
                        slot.cancel_context();
                        debug!("Forgot client {}", client_id);
                    }
                }
                if inner.queues.get(&client_id).is_none() {
                    continue;
                }
                clients.entry(client_id.clone()).or_insert_with(ClientSlot::new);
                client_id
            }
            expiration = expired.recv() => {
                let Some(expiration) = expiration else {
                    break;
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let Expired { client_id, request_id, expiry } = expiration;
                let Some(slot) = clients.get_mut(&client_id) else {
                    continue;
                };
                if slot.in_flight.as_deref() != Some(request_id.as_str()) {
                    continue;
                }
                slot.cancel_context();
                let description = match expiry {
                    Expiry::Timeout => {
                        // an answer parsed in the meantime completes the request instead
                        if inner.state.get_pending_request(&client_id, &request_id).is_none() {
                            continue;
                        }
                        "Request timed out"
                    }
                    Expiry::Canceled => "Request canceled by user",
                };
                let reason = OcppError::new(ErrorCode::GenericError, description, request_id.clone());
                inner.cancel_head(&client_id, &request_id, reason);
                slot.complete();
                client_id
            }
            ready = readiness.recv() => {
                let Some((client_id, request_id)) = ready else {
                    break;
                };
                let Some(slot) = clients.get_mut(&client_id) else {
                    continue;
                };
                if slot.in_flight.as_deref() == Some(request_id.as_str()) {
                    slot.complete();
                }
                client_id
            }
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Some(slot) = clients.get_mut(&client_id) {
            if slot.ready {
                inner.dispatch_next(&client_id, slot, &stop, &expirations);
            }
        }
    }
    debug!("Server dispatcher pump exited");
}
