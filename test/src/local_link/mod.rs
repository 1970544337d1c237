/// In-memory links for E2E testing
/// Routes frames between a server and its clients without network I/O.
/// Every direction of every connection is drained by its own task, so frames
/// arrive asynchronously and in order, as they would over a socket.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use log::debug;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use ocppj_client::transport::{
    ClientLink, DisconnectedHandler, MessageHandler as ClientMessageHandler, ReconnectedHandler,
};
use ocppj_server::transport::{
    ClientHandler, MessageHandler as ServerMessageHandler, ServerLink,
};
use ocppj_shared::LinkError;

type Frames = mpsc::UnboundedSender<Vec<u8>>;

// Server Link

#[derive(Default)]
struct ServerHandlers {
    message: Option<ServerMessageHandler>,
    new_client: Option<ClientHandler>,
    disconnected_client: Option<ClientHandler>,
}

/// [`ServerLink`] that local client links connect to
#[derive(Clone, Default)]
pub struct LocalServerLink {
    inner: Arc<ServerSide>,
}

#[derive(Default)]
struct ServerSide {
    handlers: RwLock<ServerHandlers>,
    clients: Mutex<HashMap<String, Arc<ClientSide>>>,
    listening: AtomicBool,
    fail_writes: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl LocalServerLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client link that will connect to this server
    pub fn client_link(&self) -> LocalClientLink {
        LocalClientLink {
            inner: Arc::new(ClientSide {
                server: self.inner.clone(),
                id: Mutex::new(None),
                handlers: RwLock::new(ClientHandlers::default()),
                connection: Mutex::new(None),
                fail_writes: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every frame written to clients so far, with the client id
    pub fn sent_frames(&self) -> Vec<(String, String)> {
        self.inner.sent.lock().clone()
    }

    /// Frames written to one client so far
    pub fn sent_to(&self, client_id: &str) -> Vec<String> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter(|(id, _)| id == client_id)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Delivers a raw frame to the server as if `client_id` had sent it
    pub fn inject(&self, client_id: &str, frame: &str) -> Result<(), LinkError> {
        let client = self.inner.client(client_id)?;
        client.send_to_server(frame.as_bytes())
    }

    /// Hands a frame to the server's message handler right away, whether or
    /// not `client_id` is still connected, like a frame read off a socket
    /// that closed meanwhile
    pub fn deliver_late(&self, client_id: &str, frame: &str) {
        self.inner.deliver(client_id, frame.as_bytes());
    }

    /// Makes every following write fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn connected_clients(&self) -> Vec<String> {
        self.inner.clients.lock().keys().cloned().collect()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerLink for LocalServerLink {
    async fn start(&self, port: u16, path: &str) -> Result<(), LinkError> {
        debug!("Local server listening on {}{}", port, path);
        self.inner.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.inner.listening.store(false, Ordering::SeqCst);
        let clients: Vec<Arc<ClientSide>> = self.inner.clients.lock().values().cloned().collect();
        for client in clients {
            client.disconnect(Some(LinkError::Closed {
                reason: "server stopped".to_string(),
            }));
        }
    }

    fn write(&self, client_id: &str, data: &[u8]) -> Result<(), LinkError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::io("simulated write failure"));
        }
        let client = self.inner.client(client_id)?;
        self.inner
            .sent
            .lock()
            .push((client_id.to_string(), String::from_utf8_lossy(data).into_owned()));
        client.send_to_client(data)
    }

    fn set_message_handler(&self, handler: ServerMessageHandler) {
        self.inner.handlers.write().message = Some(handler);
    }

    fn set_new_client_handler(&self, handler: ClientHandler) {
        self.inner.handlers.write().new_client = Some(handler);
    }

    fn set_disconnected_client_handler(&self, handler: ClientHandler) {
        self.inner.handlers.write().disconnected_client = Some(handler);
    }
}

impl ServerSide {
    fn client(&self, client_id: &str) -> Result<Arc<ClientSide>, LinkError> {
        self.clients
            .lock()
            .get(client_id)
            .cloned()
            .ok_or_else(|| LinkError::UnknownClient {
                client_id: client_id.to_string(),
            })
    }

    fn deliver(&self, client_id: &str, data: &[u8]) {
        let handler = self.handlers.read().message.clone();
        if let Some(handler) = handler {
            handler(client_id, data);
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
}

// Client Link

#[derive(Default)]
struct ClientHandlers {
    message: Option<ClientMessageHandler>,
    disconnected: Option<DisconnectedHandler>,
    reconnected: Option<ReconnectedHandler>,
}

struct Connection {
    to_client: Frames,
    to_server: Frames,
}

/// [`ClientLink`] attached to a [`LocalServerLink`].
///
/// The client id is the last path segment of the url passed to `start`.
/// `drop_connection` and `reconnect` simulate a flaky network.
#[derive(Clone)]
pub struct LocalClientLink {
    inner: Arc<ClientSide>,
}

struct ClientSide {
    server: Arc<ServerSide>,
    id: Mutex<Option<String>>,
    handlers: RwLock<ClientHandlers>,
    connection: Mutex<Option<Connection>>,
    fail_writes: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl LocalClientLink {
    /// Every frame this client wrote so far
    pub fn sent_frames(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Delivers a raw frame to the client as if the server had sent it
    pub fn inject(&self, frame: &str) -> Result<(), LinkError> {
        self.inner.send_to_client(frame.as_bytes())
    }

    /// Makes every following write fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Simulates the network going away under the client
    pub fn drop_connection(&self) {
        self.inner.disconnect(Some(LinkError::Closed {
            reason: "connection dropped".to_string(),
        }));
    }

    /// Re-establishes a dropped connection under the same client id
    pub fn reconnect(&self) -> Result<(), LinkError> {
        let client_id = self.inner.id.lock().clone().ok_or(LinkError::NotConnected)?;
        ClientSide::connect(&self.inner, &client_id)?;
        let handler = self.inner.handlers.read().reconnected.clone();
        if let Some(handler) = handler {
            handler();
        }
        Ok(())
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner.id.lock().clone()
    }
}

#[async_trait]
impl ClientLink for LocalClientLink {
    async fn start(&self, url: &str) -> Result<(), LinkError> {
        let client_id = url
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LinkError::ConnectFailed {
                target: url.to_string(),
                reason: "missing client id".to_string(),
            })?
            .to_string();
        *self.inner.id.lock() = Some(client_id.clone());
        ClientSide::connect(&self.inner, &client_id)
    }

    async fn stop(&self) {
        self.inner.disconnect(None);
    }

    fn write(&self, data: &[u8]) -> Result<(), LinkError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::io("simulated write failure"));
        }
        self.inner.send_to_server(data)?;
        self.inner
            .sent
            .lock()
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connection.lock().is_some()
    }

    fn set_message_handler(&self, handler: ClientMessageHandler) {
        self.inner.handlers.write().message = Some(handler);
    }

    fn set_disconnected_handler(&self, handler: DisconnectedHandler) {
        self.inner.handlers.write().disconnected = Some(handler);
    }

    fn set_reconnected_handler(&self, handler: ReconnectedHandler) {
        self.inner.handlers.write().reconnected = Some(handler);
    }
}

impl ClientSide {
    fn connect(this: &Arc<Self>, client_id: &str) -> Result<(), LinkError> {
        if !this.server.listening.load(Ordering::SeqCst) {
            return Err(LinkError::ConnectFailed {
                target: client_id.to_string(),
                reason: "server not listening".to_string(),
            });
        }
        {
            let mut clients = this.server.clients.lock();
            if clients.contains_key(client_id) {
                return Err(LinkError::ConnectFailed {
                    target: client_id.to_string(),
                    reason: "client already connected".to_string(),
                });
            }
            clients.insert(client_id.to_string(), this.clone());
        }

        let (to_client, mut client_inbox) = mpsc::unbounded_channel::<Vec<u8>>();
        let (to_server, mut server_inbox) = mpsc::unbounded_channel::<Vec<u8>>();
        *this.connection.lock() = Some(Connection {
            to_client,
            to_server,
        });

        let client = Arc::downgrade(this);
        tokio::spawn(async move {
            while let Some(frame) = client_inbox.recv().await {
                let Some(client) = client.upgrade() else {
                    break;
                };
                let handler = client.handlers.read().message.clone();
                if let Some(handler) = handler {
                    handler(&frame);
                }
            }
        });
        let server = Arc::downgrade(&this.server);
        let id = client_id.to_string();
        tokio::spawn(async move {
            while let Some(frame) = server_inbox.recv().await {
                let Some(server) = server.upgrade() else {
                    break;
                };
                server.deliver(&id, &frame);
            }
        });

        debug!("Local client {} connected", client_id);
        this.server.notify_new_client(client_id);
        Ok(())
    }

    fn disconnect(&self, reason: Option<LinkError>) {
        if self.connection.lock().take().is_none() {
            return;
        }
        let client_id = self.id.lock().clone().unwrap_or_default();
        self.server.clients.lock().remove(&client_id);
        debug!("Local client {} disconnected", client_id);

        self.server.notify_disconnected_client(&client_id);
        let handler = self.handlers.read().disconnected.clone();
        if let Some(handler) = handler {
            handler(reason);
        }
    }

    fn send_to_server(&self, data: &[u8]) -> Result<(), LinkError> {
        let connection = self.connection.lock();
        let connection = connection.as_ref().ok_or(LinkError::NotConnected)?;
        connection
            .to_server
            .send(data.to_vec())
            .map_err(|_| LinkError::NotConnected)
    }

    fn send_to_client(&self, data: &[u8]) -> Result<(), LinkError> {
        let connection = self.connection.lock();
        let connection = connection.as_ref().ok_or(LinkError::NotConnected)?;
        connection
            .to_client
            .send(data.to_vec())
            .map_err(|_| LinkError::NotConnected)
    }
}

/// A listening server link with one connectable client link
pub struct LocalLinkPair {
    pub server: LocalServerLink,
    pub client: LocalClientLink,
}

impl LocalLinkPair {
    pub fn new() -> Self {
        let server = LocalServerLink::new();
        let client = server.client_link();
        Self { server, client }
    }
}

impl Default for LocalLinkPair {
    fn default() -> Self {
        Self::new()
    }
}
