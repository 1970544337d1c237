use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use ocppj_shared::{
    CallError, ClientState, Endpoint, ErrorCode, IdGenerator, LinkError, Message, MessageType,
    OcppError, Profile, Request, RequestBundle, RequestCallback, Response,
};

use crate::{
    client_config::ClientConfig,
    dispatcher::{ClientDispatcher, RequestCanceledHandler},
    error::OcppClientError,
    transport::{ClientLink, DisconnectedHandler, ReconnectedHandler},
};

/// Invoked for each inbound Call with the request, its id and its action.
/// Reply through [`Client::send_response`] or [`Client::send_error`]
pub type RequestHandler = Arc<dyn Fn(Arc<dyn Request>, &str, &str) + Send + Sync>;
/// Invoked with each response and the id of the request it answers
pub type ResponseHandler = Arc<dyn Fn(Box<dyn Response>, &str) + Send + Sync>;
/// Invoked with each CallError answering a request, and its details
pub type ErrorHandler = Arc<dyn Fn(OcppError, Value) + Send + Sync>;
/// Inspects an invalid inbound frame (raw bytes and decoded array) and may
/// substitute the error sent back to the peer
pub type InvalidMessageHook =
    Arc<dyn Fn(&[u8], &[Value], &OcppError) -> Option<OcppError> + Send + Sync>;

#[derive(Default)]
struct Handlers {
    request: Option<RequestHandler>,
    response: Option<ResponseHandler>,
    error: Option<ErrorHandler>,
    invalid_message: Option<InvalidMessageHook>,
    disconnected: Option<DisconnectedHandler>,
    reconnected: Option<ReconnectedHandler>,
}

/// The charging station endpoint.
///
/// Opens a single link to the central system, sends requests through an
/// ordered [`ClientDispatcher`] and routes inbound frames to the installed
/// handlers. Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    id: String,
    endpoint: Endpoint,
    link: Arc<dyn ClientLink>,
    dispatcher: ClientDispatcher,
    state: Arc<ClientState>,
    id_generator: IdGenerator,
    handlers: RwLock<Handlers>,
    disconnected: Notify,
    stop_timeout: Duration,
}

impl Client {
    /// Create a new Client identified by `id`, composing the given profiles
    pub fn new(
        id: impl Into<String>,
        link: Arc<dyn ClientLink>,
        config: ClientConfig,
        profiles: Vec<Profile>,
    ) -> Result<Self, OcppClientError> {
        let mut endpoint = Endpoint::new(config.dialect);
        for profile in profiles {
            endpoint.add_profile(profile)?;
        }
        let state = Arc::new(ClientState::new());
        let dispatcher = ClientDispatcher::new(&config.dispatcher, state.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                id: id.into(),
                endpoint,
                link,
                dispatcher,
                state,
                id_generator: config.id_generator,
                handlers: RwLock::new(Handlers::default()),
                disconnected: Notify::new(),
                stop_timeout: config.stop_timeout,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn dispatcher(&self) -> &ClientDispatcher {
        &self.inner.dispatcher
    }

    // Connection

    /// Connects to `{url}/{id}` and starts dispatching
    pub async fn start(&self, url: &str) -> Result<(), OcppClientError> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.link.set_message_handler(Arc::new({
            let weak = weak.clone();
            move |data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_incoming(data);
                }
            }
        }));
        self.inner.link.set_disconnected_handler(Arc::new({
            let weak = weak.clone();
            move |err: Option<LinkError>| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_disconnected(err);
                }
            }
        }));
        self.inner.link.set_reconnected_handler(Arc::new({
            let weak: Weak<ClientInner> = weak;
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_reconnected();
                }
            }
        }));

        self.inner.dispatcher.set_link(self.inner.link.clone());
        self.inner.dispatcher.start();

        let target = format!("{}/{}", url.trim_end_matches('/'), self.inner.id);
        if let Err(err) = self.inner.link.start(&target).await {
            error!("Failed to connect to {}: {}", target, err);
            self.inner.dispatcher.stop();
            return Err(err.into());
        }
        info!("Client {} connected to {}", self.inner.id, target);
        Ok(())
    }

    /// Closes the link, waits for the disconnect to be reported and stops
    /// the dispatcher. Queued requests are discarded
    pub async fn stop(&self) {
        if self.inner.link.is_connected() {
            let disconnected = self.inner.disconnected.notified();
            self.inner.link.stop().await;
            if tokio::time::timeout(self.inner.stop_timeout, disconnected)
                .await
                .is_err()
            {
                warn!(
                    "Link did not report the disconnect within {:?}",
                    self.inner.stop_timeout
                );
            }
        } else {
            self.inner.link.stop().await;
        }
        self.inner.dispatcher.stop();
        self.inner.state.clear_pending_requests();
        info!("Client {} stopped", self.inner.id);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    // Requests

    /// Validates and queues a request. Returns the id of the outgoing Call
    pub fn send_request<Q: Request>(&self, request: Q) -> Result<String, OcppClientError> {
        let bundle = self.inner.bundle(Arc::new(request))?;
        let id = bundle.id().to_string();
        self.inner.dispatcher.send_request(bundle)?;
        Ok(id)
    }

    /// Like [`Client::send_request`], the request is dropped once `token`
    /// is cancelled and `on_canceled` is told why
    pub fn send_request_with_cancellation<Q: Request>(
        &self,
        request: Q,
        token: CancellationToken,
        on_canceled: Option<RequestCallback>,
    ) -> Result<String, OcppClientError> {
        let mut bundle = self.inner.bundle(Arc::new(request))?.with_cancellation(token);
        if let Some(callback) = on_canceled {
            bundle = bundle.with_callback(callback);
        }
        let id = bundle.id().to_string();
        self.inner.dispatcher.send_request(bundle)?;
        Ok(id)
    }

    /// Replies to an inbound Call. A response that fails validation or
    /// marshaling is replaced by a CallError on the same id
    pub fn send_response<S: Response>(&self, request_id: &str, response: S) -> Result<(), OcppClientError> {
        self.inner.send_response(request_id, Box::new(response))
    }

    /// Replies to an inbound Call with a CallError
    pub fn send_error(
        &self,
        request_id: &str,
        code: ErrorCode,
        description: &str,
        details: Value,
    ) -> Result<(), OcppClientError> {
        self.inner.send_error(request_id, code, description, details)
    }

    // Handlers

    pub fn set_request_handler<F>(&self, handler: F)
    where
        F: Fn(Arc<dyn Request>, &str, &str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().request = Some(Arc::new(handler));
    }

    pub fn set_response_handler<F>(&self, handler: F)
    where
        F: Fn(Box<dyn Response>, &str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().response = Some(Arc::new(handler));
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(OcppError, Value) + Send + Sync + 'static,
    {
        self.inner.handlers.write().error = Some(Arc::new(handler));
    }

    pub fn set_invalid_message_hook<F>(&self, hook: F)
    where
        F: Fn(&[u8], &[Value], &OcppError) -> Option<OcppError> + Send + Sync + 'static,
    {
        self.inner.handlers.write().invalid_message = Some(Arc::new(hook));
    }

    pub fn set_on_request_canceled<F>(&self, handler: F)
    where
        F: Fn(&str, Arc<dyn Request>, OcppError) + Send + Sync + 'static,
    {
        let handler: RequestCanceledHandler = Arc::new(handler);
        self.inner.dispatcher.set_on_request_canceled(handler);
    }

    pub fn set_disconnected_handler<F>(&self, handler: F)
    where
        F: Fn(Option<LinkError>) + Send + Sync + 'static,
    {
        self.inner.handlers.write().disconnected = Some(Arc::new(handler));
    }

    pub fn set_reconnected_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers.write().reconnected = Some(Arc::new(handler));
    }
}

impl ClientInner {
    fn bundle(&self, request: Arc<dyn Request>) -> Result<RequestBundle, OcppClientError> {
        let action = request.feature_name();
        let id = self.id_generator.generate();
        let call = self
            .endpoint
            .create_call(id, request)
            .map_err(|err| OcppClientError::from_outbound(err, action))?;
        let data = self.endpoint.serialize_call(&call)?;
        Ok(RequestBundle::new(call, data))
    }

    fn write(&self, data: &[u8]) -> Result<(), OcppClientError> {
        debug!("Client {} sending {}", self.id, String::from_utf8_lossy(data));
        self.link.write(data)?;
        Ok(())
    }

    fn send_response(&self, request_id: &str, response: Box<dyn Response>) -> Result<(), OcppClientError> {
        let result = match self.endpoint.create_call_result(request_id, response) {
            Ok(result) => result,
            Err(err) => {
                self.handle_failed_response_error(&err);
                return Err(OcppClientError::Validation(err));
            }
        };
        let data = match self.endpoint.serialize_call_result(&result) {
            Ok(data) => data,
            Err(err) => {
                self.handle_failed_response_error(&err.to_ocpp_error());
                return Err(err.into());
            }
        };
        self.write(&data)
    }

    fn send_error(
        &self,
        request_id: &str,
        code: ErrorCode,
        description: &str,
        details: Value,
    ) -> Result<(), OcppClientError> {
        let call_error = self
            .endpoint
            .create_call_error(request_id, code, description, details)
            .map_err(OcppClientError::Validation)?;
        self.write_call_error(&call_error)
    }

    fn write_call_error(&self, call_error: &CallError) -> Result<(), OcppClientError> {
        let data = self.endpoint.serialize_call_error(call_error)?;
        self.write(&data)
    }

    /// Degrades a response that could not be produced into a best-effort
    /// CallError, so the peer is not left waiting
    fn handle_failed_response_error(&self, err: &OcppError) {
        warn!("Replying with CallError instead of the response to {}: {}", err.message_id, err);
        if let Err(send_err) =
            self.send_error(&err.message_id, err.code.clone(), &err.description, Value::Null)
        {
            error!(
                "Failed to send CallError for request {}: {}",
                err.message_id, send_err
            );
        }
    }

    // Incoming

    fn handle_incoming(&self, data: &[u8]) {
        debug!("Client {} received {}", self.id, String::from_utf8_lossy(data));
        let elements = match self.endpoint.parse_raw_message(data) {
            Ok(elements) => elements,
            Err(err) => {
                self.handle_invalid_message(data, &[], err);
                return;
            }
        };
        let message = match self.endpoint.parse_message(&elements, &self.state) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                self.handle_invalid_message(data, &elements, err);
                return;
            }
        };

        let handlers = self.handlers.read();
        match message {
            Message::Call(call) => {
                let handler = handlers.request.clone();
                drop(handlers);
                match handler {
                    Some(handler) => handler(call.payload, &call.unique_id, &call.action),
                    None => {
                        warn!("No request handler installed, rejecting {}", call.action);
                        let description = format!("No handler for action {}", call.action);
                        if let Err(err) = self.send_error(
                            &call.unique_id,
                            ErrorCode::NotImplemented,
                            &description,
                            Value::Null,
                        ) {
                            error!("Failed to reject request {}: {}", call.unique_id, err);
                        }
                    }
                }
            }
            Message::CallResult(result) => {
                let handler = handlers.response.clone();
                drop(handlers);
                if !self.dispatcher.complete_request(&result.unique_id) {
                    debug!("Response {} arrived after its request was dropped", result.unique_id);
                    return;
                }
                if let Some(handler) = handler {
                    handler(result.payload, &result.unique_id);
                }
            }
            Message::CallError(call_error) => {
                let handler = handlers.error.clone();
                drop(handlers);
                if !self.dispatcher.complete_request(&call_error.unique_id) {
                    debug!("Error {} arrived after its request was dropped", call_error.unique_id);
                    return;
                }
                if let Some(handler) = handler {
                    handler(call_error.to_ocpp_error(), call_error.error_details);
                }
            }
        }
    }

    fn handle_invalid_message(&self, data: &[u8], elements: &[Value], err: OcppError) {
        error!("Client {} received an invalid message: {}", self.id, err);
        if !err.has_message_id() {
            return;
        }

        // a malformed answer still ends the request it answers
        if is_answer(elements) {
            self.dispatcher.cancel_request(&err.message_id, err.clone());
        }

        let hook = self.handlers.read().invalid_message.clone();
        let err = hook
            .and_then(|hook| hook(data, elements, &err))
            .unwrap_or(err);
        if let Err(send_err) =
            self.send_error(&err.message_id, err.code.clone(), &err.description, Value::Null)
        {
            error!("Failed to report invalid message {}: {}", err.message_id, send_err);
        }
    }

    fn handle_disconnected(&self, err: Option<LinkError>) {
        match &err {
            Some(err) => warn!("Client {} disconnected: {}", self.id, err),
            None => info!("Client {} disconnected", self.id),
        }
        self.dispatcher.pause();
        self.disconnected.notify_waiters();
        let handler = self.handlers.read().disconnected.clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    fn handle_reconnected(&self) {
        info!("Client {} reconnected", self.id);
        self.dispatcher.resume();
        let handler = self.handlers.read().reconnected.clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// Whether a decoded frame is a CallResult or CallError
fn is_answer(elements: &[Value]) -> bool {
    let tag = elements.first().and_then(Value::as_u64);
    tag == Some(u64::from(MessageType::CallResult.as_number()))
        || tag == Some(u64::from(MessageType::CallError.as_number()))
}
