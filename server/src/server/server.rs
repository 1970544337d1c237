use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ocppj_shared::{
    CallError, Endpoint, ErrorCode, IdGenerator, Message, MessageType, OcppError, Profile,
    Request, RequestBundle, RequestCallback, Response,
};

use crate::{
    dispatcher::{RequestCanceledHandler, ServerDispatcher},
    error::OcppServerError,
    server::ServerConfig,
    server_state::ServerState,
    transport::{ClientHandler, ServerLink},
};

/// Invoked for each inbound Call with the client id, the request, its id and
/// its action. Reply through [`Server::send_response`] or [`Server::send_error`]
pub type RequestHandler = Arc<dyn Fn(&str, Arc<dyn Request>, &str, &str) + Send + Sync>;
/// Invoked with the client id, each response and the id of the request it answers
pub type ResponseHandler = Arc<dyn Fn(&str, Box<dyn Response>, &str) + Send + Sync>;
/// Invoked with the client id, each CallError answering a request and its details
pub type ErrorHandler = Arc<dyn Fn(&str, OcppError, Value) + Send + Sync>;
/// Inspects an invalid inbound frame of a client and may substitute the
/// error sent back
pub type InvalidMessageHook =
    Arc<dyn Fn(&str, &[u8], &[Value], &OcppError) -> Option<OcppError> + Send + Sync>;

#[derive(Default)]
struct Handlers {
    request: Option<RequestHandler>,
    response: Option<ResponseHandler>,
    error: Option<ErrorHandler>,
    invalid_message: Option<InvalidMessageHook>,
    new_client: Option<ClientHandler>,
    disconnected_client: Option<ClientHandler>,
}

/// The central system endpoint.
///
/// Accepts connections from many charging stations, sends requests to each of
/// them through a shared [`ServerDispatcher`] and routes inbound frames, with
/// the id of the client they came from, to the installed handlers.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    endpoint: Endpoint,
    link: Arc<dyn ServerLink>,
    dispatcher: ServerDispatcher,
    state: Arc<ServerState>,
    id_generator: IdGenerator,
    handlers: RwLock<Handlers>,
}

impl Server {
    /// Create a new Server composing the given profiles
    pub fn new(
        link: Arc<dyn ServerLink>,
        config: ServerConfig,
        profiles: Vec<Profile>,
    ) -> Result<Self, OcppServerError> {
        let mut endpoint = Endpoint::new(config.dialect);
        for profile in profiles {
            endpoint.add_profile(profile)?;
        }
        let state = Arc::new(ServerState::new());
        let dispatcher = ServerDispatcher::new(&config.dispatcher, state.clone());

        Ok(Self {
            inner: Arc::new(ServerInner {
                endpoint,
                link,
                dispatcher,
                state,
                id_generator: config.id_generator,
                handlers: RwLock::new(Handlers::default()),
            }),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn dispatcher(&self) -> &ServerDispatcher {
        &self.inner.dispatcher
    }

    pub fn state(&self) -> &ServerState {
        &self.inner.state
    }

    // Connection

    /// Starts dispatching and listens on `port` for clients connecting under `path`
    pub async fn start(&self, port: u16, path: &str) -> Result<(), OcppServerError> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.link.set_new_client_handler(Arc::new({
            let weak = weak.clone();
            move |client_id: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_new_client(client_id);
                }
            }
        }));
        self.inner.link.set_disconnected_client_handler(Arc::new({
            let weak = weak.clone();
            move |client_id: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_disconnected_client(client_id);
                }
            }
        }));
        self.inner.link.set_message_handler(Arc::new({
            let weak: Weak<ServerInner> = weak;
            move |client_id: &str, data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_incoming(client_id, data);
                }
            }
        }));

        self.inner.dispatcher.set_link(self.inner.link.clone());
        self.inner.dispatcher.start();
        if let Err(err) = self.inner.link.start(port, path).await {
            error!("Failed to listen on port {}: {}", port, err);
            self.inner.dispatcher.stop();
            return Err(err.into());
        }
        info!("Server listening on port {} under {}", port, path);
        Ok(())
    }

    /// Closes every connection, stops the dispatcher and clears all pending state
    pub async fn stop(&self) {
        self.inner.link.stop().await;
        self.inner.dispatcher.stop();
        self.inner.state.clear_all_pending_requests();
        info!("Server stopped");
    }

    // Requests

    /// Validates and queues a request for a client. Returns the id of the
    /// outgoing Call
    pub fn send_request<Q: Request>(&self, client_id: &str, request: Q) -> Result<String, OcppServerError> {
        let bundle = self.inner.bundle(Arc::new(request))?;
        let id = bundle.id().to_string();
        self.inner.dispatcher.send_request(client_id, bundle)?;
        Ok(id)
    }

    /// Like [`Server::send_request`], the request is dropped once `token`
    /// is cancelled and `on_canceled` is told why
    pub fn send_request_with_cancellation<Q: Request>(
        &self,
        client_id: &str,
        request: Q,
        token: CancellationToken,
        on_canceled: Option<RequestCallback>,
    ) -> Result<String, OcppServerError> {
        let mut bundle = self.inner.bundle(Arc::new(request))?.with_cancellation(token);
        if let Some(callback) = on_canceled {
            bundle = bundle.with_callback(callback);
        }
        let id = bundle.id().to_string();
        self.inner.dispatcher.send_request(client_id, bundle)?;
        Ok(id)
    }

    /// Replies to an inbound Call. A response that fails validation or
    /// marshaling is replaced by a CallError on the same id
    pub fn send_response<S: Response>(
        &self,
        client_id: &str,
        request_id: &str,
        response: S,
    ) -> Result<(), OcppServerError> {
        self.inner.send_response(client_id, request_id, Box::new(response))
    }

    /// Replies to an inbound Call with a CallError
    pub fn send_error(
        &self,
        client_id: &str,
        request_id: &str,
        code: ErrorCode,
        description: &str,
        details: Value,
    ) -> Result<(), OcppServerError> {
        self.inner
            .send_error(client_id, request_id, code, description, details)
    }

    // Handlers

    pub fn set_request_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Arc<dyn Request>, &str, &str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().request = Some(Arc::new(handler));
    }

    pub fn set_response_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Box<dyn Response>, &str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().response = Some(Arc::new(handler));
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str, OcppError, Value) + Send + Sync + 'static,
    {
        self.inner.handlers.write().error = Some(Arc::new(handler));
    }

    pub fn set_invalid_message_hook<F>(&self, hook: F)
    where
        F: Fn(&str, &[u8], &[Value], &OcppError) -> Option<OcppError> + Send + Sync + 'static,
    {
        self.inner.handlers.write().invalid_message = Some(Arc::new(hook));
    }

    pub fn set_on_request_canceled<F>(&self, handler: F)
    where
        F: Fn(&str, &str, Arc<dyn Request>, OcppError) + Send + Sync + 'static,
    {
        let handler: RequestCanceledHandler = Arc::new(handler);
        self.inner.dispatcher.set_on_request_canceled(handler);
    }

    pub fn set_new_client_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().new_client = Some(Arc::new(handler));
    }

    pub fn set_disconnected_client_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.handlers.write().disconnected_client = Some(Arc::new(handler));
    }
}

impl ServerInner {
    fn bundle(&self, request: Arc<dyn Request>) -> Result<RequestBundle, OcppServerError> {
        let action = request.feature_name();
        let id = self.id_generator.generate();
        let call = self
            .endpoint
            .create_call(id, request)
            .map_err(|err| OcppServerError::from_outbound(err, action))?;
        let data = self.endpoint.serialize_call(&call)?;
        Ok(RequestBundle::new(call, data))
    }

    fn write(&self, client_id: &str, data: &[u8]) -> Result<(), OcppServerError> {
        debug!("Sending to {}: {}", client_id, String::from_utf8_lossy(data));
        self.link.write(client_id, data)?;
        Ok(())
    }

    fn send_response(
        &self,
        client_id: &str,
        request_id: &str,
        response: Box<dyn Response>,
    ) -> Result<(), OcppServerError> {
        let result = match self.endpoint.create_call_result(request_id, response) {
            Ok(result) => result,
            Err(err) => {
                self.handle_failed_response_error(client_id, &err);
                return Err(OcppServerError::Validation(err));
            }
        };
        let data = match self.endpoint.serialize_call_result(&result) {
            Ok(data) => data,
            Err(err) => {
                self.handle_failed_response_error(client_id, &err.to_ocpp_error());
                return Err(err.into());
            }
        };
        self.write(client_id, &data)
    }

    fn send_error(
        &self,
        client_id: &str,
        request_id: &str,
        code: ErrorCode,
        description: &str,
        details: Value,
    ) -> Result<(), OcppServerError> {
        let call_error = self
            .endpoint
            .create_call_error(request_id, code, description, details)
            .map_err(OcppServerError::Validation)?;
        self.write_call_error(client_id, &call_error)
    }

    fn write_call_error(&self, client_id: &str, call_error: &CallError) -> Result<(), OcppServerError> {
        let data = self.endpoint.serialize_call_error(call_error)?;
        self.write(client_id, &data)
    }

    /// Degrades a response that could not be produced into a best-effort
    /// CallError, so the client is not left waiting
    fn handle_failed_response_error(&self, client_id: &str, err: &OcppError) {
        warn!(
            "Replying with CallError instead of the response to {} of client {}: {}",
            err.message_id, client_id, err
        );
        if let Err(send_err) = self.send_error(
            client_id,
            &err.message_id,
            err.code.clone(),
            &err.description,
            Value::Null,
        ) {
            error!(
                "Failed to send CallError for request {} of client {}: {}",
                err.message_id, client_id, send_err
            );
        }
    }

    // Connections

    fn handle_new_client(&self, client_id: &str) {
        info!("Client {} connected", client_id);
        self.dispatcher.create_client(client_id);
        self.state.get_client_state(client_id);
        let handler = self.handlers.read().new_client.clone();
        if let Some(handler) = handler {
            handler(client_id);
        }
    }

    fn handle_disconnected_client(&self, client_id: &str) {
        info!("Client {} disconnected", client_id);
        self.dispatcher.delete_client(client_id);
        // a request in flight to a client that went away is never answered
        self.state.clear_client_pending_request(client_id);
        let handler = self.handlers.read().disconnected_client.clone();
        if let Some(handler) = handler {
            handler(client_id);
        }
    }

    // Incoming

    fn handle_incoming(&self, client_id: &str, data: &[u8]) {
        debug!("Received from {}: {}", client_id, String::from_utf8_lossy(data));
        let elements = match self.endpoint.parse_raw_message(data) {
            Ok(elements) => elements,
            Err(err) => {
                self.handle_invalid_message(client_id, data, &[], err);
                return;
            }
        };
        // a client that is already gone has nothing pending, so its answers are stale
        let state = self.state.find_client_state(client_id).unwrap_or_default();
        let message = match self.endpoint.parse_message(&elements, &state) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                self.handle_invalid_message(client_id, data, &elements, err);
                return;
            }
        };

        let handlers = self.handlers.read();
        match message {
            Message::Call(call) => {
                let handler = handlers.request.clone();
                drop(handlers);
                match handler {
                    Some(handler) => handler(client_id, call.payload, &call.unique_id, &call.action),
                    None => {
                        warn!("No request handler installed, rejecting {}", call.action);
                        let description = format!("No handler for action {}", call.action);
                        if let Err(err) = self.send_error(
                            client_id,
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
                if !self.dispatcher.complete_request(client_id, &result.unique_id) {
                    debug!(
                        "Response {} of client {} arrived after its request was dropped",
                        result.unique_id, client_id
                    );
                    return;
                }
                if let Some(handler) = handler {
                    handler(client_id, result.payload, &result.unique_id);
                }
            }
            Message::CallError(call_error) => {
                let handler = handlers.error.clone();
                drop(handlers);
                if !self.dispatcher.complete_request(client_id, &call_error.unique_id) {
                    debug!(
                        "Error {} of client {} arrived after its request was dropped",
                        call_error.unique_id, client_id
                    );
                    return;
                }
                if let Some(handler) = handler {
                    handler(client_id, call_error.to_ocpp_error(), call_error.error_details);
                }
            }
        }
    }

    fn handle_invalid_message(&self, client_id: &str, data: &[u8], elements: &[Value], err: OcppError) {
        error!("Client {} sent an invalid message: {}", client_id, err);
        if !err.has_message_id() {
            return;
        }

        // a malformed answer still ends the request it answers
        if is_answer(elements) {
            self.dispatcher
                .cancel_request(client_id, &err.message_id, err.clone());
        }

        let hook = self.handlers.read().invalid_message.clone();
        let err = hook
            .and_then(|hook| hook(client_id, data, elements, &err))
            .unwrap_or(err);
        if let Err(send_err) = self.send_error(
            client_id,
            &err.message_id,
            err.code.clone(),
            &err.description,
            Value::Null,
        ) {
            error!(
                "Failed to report invalid message {} to client {}: {}",
                err.message_id, client_id, send_err
            );
        }
    }
}

/// Whether a decoded frame is a CallResult or CallError
fn is_answer(elements: &[Value]) -> bool {
    let tag = elements.first().and_then(Value::as_u64);
    tag == Some(u64::from(MessageType::CallResult.as_number()))
        || tag == Some(u64::from(MessageType::CallError.as_number()))
}
