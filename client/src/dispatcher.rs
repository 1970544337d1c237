use std::{
    future::pending,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::mpsc,
    time::{sleep, Sleep},
};
use tokio_util::sync::CancellationToken;

use ocppj_shared::{
    ClientState, DispatcherConfig, ErrorCode, OcppError, Request, RequestBundle, RequestQueue,
};

use crate::{error::OcppClientError, transport::ClientLink};

/// Invoked with the id, the original request and the reason whenever an
/// outbound request is dropped without an answer
pub type RequestCanceledHandler = Arc<dyn Fn(&str, Arc<dyn Request>, OcppError) + Send + Sync>;

enum PumpSignal {
    NewRequest,
    Completed(String),
    Pause,
    Resume,
}

struct Running {
    signals: mpsc::UnboundedSender<PumpSignal>,
    stop: CancellationToken,
}

struct InFlight {
    id: String,
    cancellation: Option<CancellationToken>,
}

/// Single-peer outbound dispatcher.
///
/// Requests are queued and written to the link one at a time: the next Call
/// leaves only once the previous one was answered, errored, canceled or
/// timed out. A background pump task owns the timer and the in-flight slot.
#[derive(Clone)]
pub struct ClientDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    queue: RequestQueue,
    state: Arc<ClientState>,
    link: RwLock<Option<Arc<dyn ClientLink>>>,
    timeout: Mutex<Duration>,
    on_request_canceled: RwLock<Option<RequestCanceledHandler>>,
    running: Mutex<Option<Running>>,
    paused: AtomicBool,
}

impl ClientDispatcher {
    pub fn new(config: &DispatcherConfig, state: Arc<ClientState>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                queue: RequestQueue::new(config.queue_capacity),
                state,
                link: RwLock::new(None),
                timeout: Mutex::new(config.request_timeout),
                on_request_canceled: RwLock::new(None),
                running: Mutex::new(None),
                paused: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the pump task. Must be called from within a tokio runtime
    pub fn start(&self) {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            warn!("Client dispatcher already running");
            return;
        }
        self.inner.queue.init();
        self.inner.paused.store(false, Ordering::SeqCst);

        let (signals, receiver) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        tokio::spawn(pump(Arc::downgrade(&self.inner), receiver, stop.clone()));
        *running = Some(Running { signals, stop });
        info!("Client dispatcher started");
    }

    /// Stops the pump and discards queued and pending requests without
    /// invoking any cancellation callback
    pub fn stop(&self) {
        let running = self.inner.running.lock().take();
        let Some(running) = running else {
            return;
        };
        drop(running.signals);
        running.stop.cancel();
        self.inner.queue.init();
        self.inner.state.clear_pending_requests();
        info!("Client dispatcher stopped");
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

    pub fn set_link(&self, link: Arc<dyn ClientLink>) {
        *self.inner.link.write() = Some(link);
    }

    pub fn set_on_request_canceled(&self, handler: RequestCanceledHandler) {
        *self.inner.on_request_canceled.write() = Some(handler);
    }

    /// Enqueues a request and wakes the pump. Never waits on the network
    pub fn send_request(&self, bundle: RequestBundle) -> Result<(), OcppClientError> {
        let running = self.inner.running.lock();
        let Some(running) = running.as_ref() else {
            return Err(OcppClientError::NotStarted);
        };
        if self.inner.link.read().is_none() {
            return Err(OcppClientError::NotConnected);
        }
        let id = bundle.id().to_string();
        self.inner.queue.push(bundle)?;
        debug!("Queued request {} ({} queued)", id, self.inner.queue.size());
        let _ = running.signals.send(PumpSignal::NewRequest);
        Ok(())
    }

    /// Marks the in-flight request as answered. The id must be the head of
    /// the queue, otherwise nothing changes and `false` is returned
    pub fn complete_request(&self, id: &str) -> bool {
        match self.inner.queue.pop_if_head(id) {
            Some(_) => {
                self.inner.state.delete_pending_request(id);
                self.inner.signal(PumpSignal::Completed(id.to_string()));
                debug!("Completed request {}", id);
                true
            }
            None => {
                error!(
                    "Attempted to complete request {}, but the queue head is {:?}",
                    id,
                    self.inner.queue.head_id()
                );
                false
            }
        }
    }

    /// Drops the in-flight request with the given reason, notifying the
    /// request owner and the canceled handler
    pub fn cancel_request(&self, id: &str, reason: OcppError) -> bool {
        if self.inner.cancel_head(id, reason) {
            self.inner.signal(PumpSignal::Completed(id.to_string()));
            true
        } else {
            false
        }
    }

    /// Freezes dispatching and the response timer, e.g. while the link is down
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner.signal(PumpSignal::Pause);
        info!("Client dispatcher paused");
    }

    /// Restarts the timer of a pending request, or dispatches the next one.
    /// Does nothing unless paused
    pub fn resume(&self) {
        if !self.inner.paused.swap(false, Ordering::SeqCst) {
            debug!("Client dispatcher not paused, ignoring resume");
            return;
        }
        self.inner.signal(PumpSignal::Resume);
        info!("Client dispatcher resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.size()
    }

    pub fn has_pending_request(&self) -> bool {
        self.inner.state.has_pending_request()
    }
}

impl DispatcherInner {
    fn signal(&self, signal: PumpSignal) {
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running.signals.send(signal);
        }
    }

    fn new_timer(&self) -> Option<Pin<Box<Sleep>>> {
        let timeout = *self.timeout.lock();
        if timeout.is_zero() {
            None
        } else {
            Some(Box::pin(sleep(timeout)))
        }
    }

    /// Pops the queue head and its pending entry, if the head is `id`
    fn cancel_head(&self, id: &str, reason: OcppError) -> bool {
        match self.queue.pop_if_head(id) {
            Some(bundle) => {
                self.state.delete_pending_request(id);
                warn!("Request {} canceled: {}", id, reason);
                self.notify_canceled(&bundle, reason);
                true
            }
            None => false,
        }
    }

    fn notify_canceled(&self, bundle: &RequestBundle, reason: OcppError) {
        bundle.notify_canceled(reason.clone());
        let handler = self.on_request_canceled.read().clone();
        if let Some(handler) = handler {
            handler(bundle.id(), bundle.call.payload.clone(), reason);
        }
    }

    /// Writes the first live request of the queue to the link
    fn dispatch_next(&self) -> Option<InFlight> {
        let link = self.link.read().clone()?;
        loop {
            let bundle = self.queue.peek()?;
            let id = bundle.id().to_string();

            if bundle.is_canceled() {
                if let Some(bundle) = self.queue.pop_if_head(&id) {
                    debug!("Dropping request {} canceled before dispatch", id);
                    self.notify_canceled(
                        &bundle,
                        OcppError::new(ErrorCode::GenericError, "Request canceled by user", id),
                    );
                }
                continue;
            }

            self.state
                .add_pending_request(&id, bundle.call.payload.clone());
            if let Err(err) = link.write(&bundle.data) {
                error!("Failed to write request {}: {}", id, err);
                let reason = OcppError::new(ErrorCode::InternalError, err.to_string(), id.clone());
                self.cancel_head(&id, reason);
                continue;
            }
            debug!("Dispatched request {} ({})", id, bundle.call.action);
            return Some(InFlight {
                id,
                cancellation: bundle.cancellation.clone(),
            });
        }
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
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
    mut signals: mpsc::UnboundedReceiver<PumpSignal>,
    stop: CancellationToken,
) {
    let mut timer: Option<Pin<Box<Sleep>>> = None;
    let mut in_flight: Option<InFlight> = None;

    loop {
        let user_cancellation = in_flight
            .as_ref()
            .and_then(|flight| flight.cancellation.clone());

        tokio::select! {
            _ = stop.cancelled() => break,
            signal = signals.recv() => {
                let Some(signal) = signal else {
                    break;
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                match signal {
                    PumpSignal::NewRequest => {}
                    PumpSignal::Completed(id) => {
                        if in_flight.as_ref().is_some_and(|flight| flight.id == id) {
                            in_flight = None;
                            timer = None;
                        }
                    }
                    PumpSignal::Pause => {
                        timer = None;
                    }
                    PumpSignal::Resume => {
                        if let Some(flight) = &in_flight {
                            if inner.state.get_pending_request(&flight.id).is_some() {
                                debug!("Restarting timeout of pending request {}", flight.id);
                                timer = inner.new_timer();
                            }
                        }
                    }
                }
            }
            _ = expire(&mut timer) => {
                timer = None;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                // a pause racing the timer wins, resume restarts the interval;
                // an answer parsed in the meantime completes the request instead
                let expired = in_flight.as_ref().is_some_and(|flight| {
                    inner.state.get_pending_request(&flight.id).is_some()
                });
                if expired && !inner.paused.load(Ordering::SeqCst) {
                    if let Some(flight) = in_flight.take() {
                        let reason = OcppError::new(
                            ErrorCode::GenericError,
                            "Request timed out",
                            flight.id.clone(),
                        );
                        inner.cancel_head(&flight.id, reason);
                    }
                }
            }
            _ = canceled_by_user(user_cancellation.as_ref()) => {
                timer = None;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if let Some(flight) = in_flight.take() {
                    let reason = OcppError::new(
                        ErrorCode::GenericError,
                        "Request canceled by user",
                        flight.id.clone(),
                    );
                    inner.cancel_head(&flight.id, reason);
                }
            }
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if in_flight.is_none() && !inner.paused.load(Ordering::SeqCst) {
            if let Some(flight) = inner.dispatch_next() {
                timer = inner.new_timer();
                in_flight = Some(flight);
            }
        }
    }
    debug!("Client dispatcher pump exited");
}
