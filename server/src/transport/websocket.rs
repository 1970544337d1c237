use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue, StatusCode},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use ocppj_shared::LinkError;

use super::{ClientHandler, MessageHandler, ServerLink};

pub const OCPP16_SUBPROTOCOL: &str = "ocpp1.6";

/// Contains Config properties which will be used by the WebSocket link
#[derive(Clone, Debug)]
pub struct WebSocketServerConfig {
    /// Address the listener binds to, together with the port given on start
    pub bind_address: String,
    /// Accepted in `Sec-WebSocket-Protocol`, empty to negotiate none
    pub subprotocol: String,
}

impl Default for WebSocketServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            subprotocol: OCPP16_SUBPROTOCOL.to_string(),
        }
    }
}

#[derive(Default)]
struct Handlers {
    message: Option<MessageHandler>,
    new_client: Option<ClientHandler>,
    disconnected_client: Option<ClientHandler>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
}

/// [`ServerLink`] over tokio-tungstenite.
///
/// Clients connect to `ws://host:port{path}/{client id}`. A second connection
/// for an id that is already connected is refused with `409 Conflict`.
pub struct WebSocketServerLink {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    config: WebSocketServerConfig,
    handlers: RwLock<Handlers>,
    connections: Mutex<HashMap<String, Connection>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketServerLink {
    pub fn new(config: WebSocketServerConfig) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                config,
                handlers: RwLock::new(Handlers::default()),
                connections: Mutex::new(HashMap::new()),
                local_addr: Mutex::new(None),
                shutdown: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// The bound address, once started. Useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn connected_clients(&self) -> Vec<String> {
        self.inner.connections.lock().keys().cloned().collect()
    }
}

impl Default for WebSocketServerLink {
    fn default() -> Self {
        Self::new(WebSocketServerConfig::default())
    }
}

#[async_trait]
impl ServerLink for WebSocketServerLink {
    async fn start(&self, port: u16, path: &str) -> Result<(), LinkError> {
        let target = format!("{}:{}", self.inner.config.bind_address, port);
        let listener = TcpListener::bind(&target)
            .await
            .map_err(|err| LinkError::ConnectFailed {
                target: target.clone(),
                reason: err.to_string(),
            })?;
        *self.inner.local_addr.lock() = listener.local_addr().ok();

        let shutdown = CancellationToken::new();
        *self.inner.shutdown.lock() = Some(shutdown.clone());
        let base_path = path.trim_end_matches('/').to_string();
        let task = tokio::spawn(accept_loop(self.inner.clone(), listener, base_path, shutdown));
        *self.inner.task.lock() = Some(task);
        info!("WebSocket link listening on {}", target);
        Ok(())
    }

    async fn stop(&self) {
        let shutdown = self.inner.shutdown.lock().take();
        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        *self.inner.local_addr.lock() = None;
    }

    fn write(&self, client_id: &str, data: &[u8]) -> Result<(), LinkError> {
        let text = std::str::from_utf8(data).map_err(LinkError::io)?;
        let connections = self.inner.connections.lock();
        let connection = connections
            .get(client_id)
            .ok_or_else(|| LinkError::UnknownClient {
                client_id: client_id.to_string(),
            })?;
        connection
            .outbound
            .send(Message::text(text.to_string()))
            .map_err(|_| LinkError::Closed {
                reason: format!("connection of {} is closing", client_id),
            })
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        self.inner.handlers.write().message = Some(handler);
    }

    fn set_new_client_handler(&self, handler: ClientHandler) {
        self.inner.handlers.write().new_client = Some(handler);
    }

    fn set_disconnected_client_handler(&self, handler: ClientHandler) {
        self.inner.handlers.write().disconnected_client = Some(handler);
    }
}

impl LinkInner {
    fn is_connected(&self, client_id: &str) -> bool {
        self.connections.lock().contains_key(client_id)
    }

    /// Registers a connection, unless the id got connected concurrently
    fn register(&self, client_id: &str) -> Option<mpsc::UnboundedReceiver<Message>> {
        let mut connections = self.connections.lock();
        if connections.contains_key(client_id) {
            return None;
        }
        let (outbound, receiver) = mpsc::unbounded_channel();
        connections.insert(client_id.to_string(), Connection { outbound });
        Some(receiver)
    }

    fn unregister(&self, client_id: &str) {
        self.connections.lock().remove(client_id);
    }

    fn deliver(&self, client_id: &str, data: &[u8]) {
        let handler = self.handlers.read().message.clone();
        match handler {
            Some(handler) => handler(client_id, data),
            None => warn!("Dropping frame of {}, no message handler installed", client_id),
        }
    }

    fn notify_new_client(&self, client_id: &str) {
        let handler = self.handlers.read().new_client.clone();
        if let Some(handler) = handler {
            handler(client_id);
        }
    }

    fn notify_disconnected_client(&self, client_id: &str) {
        let handler = self.handlers.read().disconnected_client.clone();
        if let Some(handler) = handler {
            handler(client_id);
        }
    }

    /// Checks the upgrade request: path, duplicate id and subprotocol
    fn handshake(
        &self,
        base_path: &str,
        request: &Request,
        mut response: Response,
    ) -> Result<(String, Response), ErrorResponse> {
        let client_id = request
            .uri()
            .path()
            .strip_prefix(base_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .ok_or_else(|| reject(StatusCode::NOT_FOUND, "unexpected path"))?;

        if self.is_connected(client_id) {
            return Err(reject(
                StatusCode::CONFLICT,
                &format!("client {} already connected", client_id),
            ));
        }

        let subprotocol = &self.config.subprotocol;
        if !subprotocol.is_empty() {
            let offered = request
                .headers()
                .get_all(SEC_WEBSOCKET_PROTOCOL)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|protocol| protocol.trim() == subprotocol);
            if offered {
                if let Ok(value) = HeaderValue::from_str(subprotocol) {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
            } else {
                debug!("Client {} did not offer {}", client_id, subprotocol);
            }
        }
        Ok((client_id.to_string(), response))
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

async fn accept_loop(
    inner: Arc<LinkInner>,
    listener: TcpListener,
    base_path: String,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Accepted TCP connection from {}", addr);
                    tokio::spawn(handle_connection(
                        inner.clone(),
                        stream,
                        base_path.clone(),
                        shutdown.child_token(),
                    ));
                }
                Err(err) => warn!("Failed to accept connection: {}", err),
            }
        }
    }
    debug!("WebSocket listener shut down");
}

async fn handle_connection(
    inner: Arc<LinkInner>,
    stream: TcpStream,
    base_path: String,
    shutdown: CancellationToken,
) {
    let mut client_id = None;
    let callback = |request: &Request, response: Response| {
        let (id, response) = inner.handshake(&base_path, request, response)?;
        client_id = Some(id);
        Ok(response)
    };
    let stream = match accept_hdr_async(stream, callback).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("WebSocket handshake failed: {}", err);
            return;
        }
    };
    let Some(client_id) = client_id else {
        return;
    };
    let Some(outbound) = inner.register(&client_id) else {
        warn!("Refusing duplicate connection of {}", client_id);
        let mut stream = stream;
        let _ = stream
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "already connected".into(),
            }))
            .await;
        return;
    };

    info!("Client {} connected", client_id);
    inner.notify_new_client(&client_id);
    serve(&inner, &client_id, stream, outbound, &shutdown).await;
    inner.unregister(&client_id);
    info!("Client {} disconnected", client_id);
    inner.notify_disconnected_client(&client_id);
}

async fn serve(
    inner: &LinkInner,
    client_id: &str,
    stream: WebSocketStream<TcpStream>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shutdown: &CancellationToken,
) {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return;
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return;
                };
                if let Err(err) = sink.send(message).await {
                    warn!("Failed to write to {}: {}", client_id, err);
                    return;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.deliver(client_id, text.as_str().as_bytes()),
                Some(Ok(Message::Binary(_))) => warn!("Ignoring binary frame of {}", client_id),
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("Connection of {} failed: {}", client_id, err);
                    return;
                }
            }
        }
    }
}
