use std::sync::Arc;

use async_trait::async_trait;

use ocppj_shared::LinkError;

cfg_if! {
    if #[cfg(feature = "transport_websocket")] {
        pub mod websocket;
    } else {}
}

/// Receives every inbound text frame, in receipt order
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;
/// Receives the reason the link went down, `None` for a local close
pub type DisconnectedHandler = Arc<dyn Fn(Option<LinkError>) + Send + Sync>;
pub type ReconnectedHandler = Arc<dyn Fn() + Send + Sync>;

/// The station side of the message channel.
///
/// A link owns its connection and reports lifecycle events through the
/// installed handlers. `write` must not block: implementations hand the frame
/// to their own writer and return.
#[async_trait]
pub trait ClientLink: Send + Sync {
    /// Connects to `url`. Returns once the first connection is established
    async fn start(&self, url: &str) -> Result<(), LinkError>;

    /// Closes the connection and stops reconnecting
    async fn stop(&self);

    /// Sends a single text frame
    fn write(&self, data: &[u8]) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;

    fn set_message_handler(&self, handler: MessageHandler);

    fn set_disconnected_handler(&self, handler: DisconnectedHandler);

    fn set_reconnected_handler(&self, handler: ReconnectedHandler);
}
