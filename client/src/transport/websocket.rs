use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::sleep};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use ocppj_shared::LinkError;

use super::{ClientLink, DisconnectedHandler, MessageHandler, ReconnectedHandler};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connection = (Stream, mpsc::UnboundedReceiver<Message>);

pub const OCPP16_SUBPROTOCOL: &str = "ocpp1.6";

/// Contains Config properties which will be used by the WebSocket link
#[derive(Clone, Debug)]
pub struct WebSocketClientConfig {
    /// Offered in `Sec-WebSocket-Protocol`, empty to offer none
    pub subprotocol: String,
    /// Wait before the first reconnect attempt
    pub reconnect_initial_backoff: Duration,
    /// Growth of the wait after each failed attempt
    pub reconnect_backoff_factor: u32,
    pub reconnect_max_backoff: Duration,
}

impl Default for WebSocketClientConfig {
    fn default() -> Self {
        Self {
            subprotocol: OCPP16_SUBPROTOCOL.to_string(),
            reconnect_initial_backoff: Duration::from_secs(5),
            reconnect_backoff_factor: 2,
            reconnect_max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct Handlers {
    message: Option<MessageHandler>,
    disconnected: Option<DisconnectedHandler>,
    reconnected: Option<ReconnectedHandler>,
}

/// [`ClientLink`] over a tokio-tungstenite WebSocket.
///
/// Text frames only. After an unexpected close the link keeps reconnecting
/// with exponential backoff until stopped.
pub struct WebSocketClientLink {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    config: WebSocketClientConfig,
    handlers: RwLock<Handlers>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connected: AtomicBool,
    shutdown: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketClientLink {
    pub fn new(config: WebSocketClientConfig) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                config,
                handlers: RwLock::new(Handlers::default()),
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                shutdown: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }
}

impl Default for WebSocketClientLink {
    fn default() -> Self {
        Self::new(WebSocketClientConfig::default())
    }
}

#[async_trait]
impl ClientLink for WebSocketClientLink {
    async fn start(&self, url: &str) -> Result<(), LinkError> {
        let stream = self.inner.connect(url).await?;
        let outbound = self.inner.attach();
        let shutdown = CancellationToken::new();
        *self.inner.shutdown.lock() = Some(shutdown.clone());

        let task = tokio::spawn(run(
            self.inner.clone(),
            url.to_string(),
            (stream, outbound),
            shutdown,
        ));
        *self.inner.task.lock() = Some(task);
        info!("WebSocket link connected to {}", url);
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
    }

    fn write(&self, data: &[u8]) -> Result<(), LinkError> {
        let text = std::str::from_utf8(data).map_err(LinkError::io)?;
        let outbound = self.inner.outbound.lock();
        let sender = outbound.as_ref().ok_or(LinkError::NotConnected)?;
        sender
            .send(Message::text(text.to_string()))
            .map_err(|_| LinkError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        self.inner.handlers.write().message = Some(handler);
    }

    fn set_disconnected_handler(&self, handler: DisconnectedHandler) {
        self.inner.handlers.write().disconnected = Some(handler);
    }

    fn set_reconnected_handler(&self, handler: ReconnectedHandler) {
        self.inner.handlers.write().reconnected = Some(handler);
    }
}

impl LinkInner {
    async fn connect(&self, url: &str) -> Result<Stream, LinkError> {
        let connect_failed = |reason: String| LinkError::ConnectFailed {
            target: url.to_string(),
            reason,
        };
        let mut request = url
            .into_client_request()
            .map_err(|err| connect_failed(err.to_string()))?;
        if !self.config.subprotocol.is_empty() {
            let protocol = HeaderValue::from_str(&self.config.subprotocol)
                .map_err(|err| connect_failed(err.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }
        let (stream, _) = connect_async(request)
            .await
            .map_err(|err| connect_failed(err.to_string()))?;
        Ok(stream)
    }

    fn attach(&self) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(sender);
        self.connected.store(true, Ordering::SeqCst);
        receiver
    }

    fn detach(&self) {
        self.outbound.lock().take();
        self.connected.store(false, Ordering::SeqCst);
    }

    fn deliver(&self, data: &[u8]) {
        let handler = self.handlers.read().message.clone();
        match handler {
            Some(handler) => handler(data),
            None => warn!("Dropping inbound frame, no message handler installed"),
        }
    }

    fn notify_disconnected(&self, reason: Option<LinkError>) {
        let handler = self.handlers.read().disconnected.clone();
        if let Some(handler) = handler {
            handler(reason);
        }
    }

    fn notify_reconnected(&self) {
        let handler = self.handlers.read().reconnected.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.config.reconnect_backoff_factor)
            .min(self.config.reconnect_max_backoff)
    }
}

async fn run(inner: Arc<LinkInner>, url: String, first: Connection, shutdown: CancellationToken) {
    let mut connection = Some(first);
    while let Some((stream, outbound)) = connection.take() {
        let reason = serve(&inner, stream, outbound, &shutdown).await;
        inner.detach();
        inner.notify_disconnected(reason);
        if shutdown.is_cancelled() {
            break;
        }
        connection = reconnect(&inner, &url, &shutdown).await;
        if connection.is_some() {
            info!("WebSocket link reconnected to {}", url);
            inner.notify_reconnected();
        }
    }
    debug!("WebSocket link to {} shut down", url);
}

/// Pumps one connection until it closes. Returns `None` on a local close
async fn serve(
    inner: &LinkInner,
    stream: Stream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shutdown: &CancellationToken,
) -> Option<LinkError> {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return None;
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return None;
                };
                if let Err(err) = sink.send(message).await {
                    return Some(LinkError::io(err));
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.deliver(text.as_str().as_bytes()),
                Some(Ok(Message::Binary(_))) => warn!("Ignoring binary frame"),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_string())
                        .unwrap_or_default();
                    return Some(LinkError::Closed { reason });
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Some(LinkError::io(err)),
                None => {
                    return Some(LinkError::Closed {
                        reason: "connection reset".to_string(),
                    })
                }
            }
        }
    }
}

async fn reconnect(
    inner: &LinkInner,
    url: &str,
    shutdown: &CancellationToken,
) -> Option<Connection> {
    let mut backoff = inner.config.reconnect_initial_backoff;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = sleep(backoff) => {}
        }
        match inner.connect(url).await {
            Ok(stream) => return Some((stream, inner.attach())),
            Err(err) => {
                backoff = inner.next_backoff(backoff);
                warn!("Reconnecting to {} failed, retrying in {:?}: {}", url, backoff, err);
            }
        }
    }
}
