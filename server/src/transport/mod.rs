use std::sync::Arc;

use async_trait::async_trait;

use ocppj_shared::LinkError;

cfg_if! {
    if #[cfg(feature = "transport_websocket")] {
        pub mod websocket;
    } else {}
}

/// Receives every inbound text frame of a client, in receipt order per client
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;
/// Receives the id of a client that connected or disconnected
pub type ClientHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// The central system side of the message channel: accepts connections from
/// many clients, each identified by a string id.
///
/// `write` must not block: implementations hand the frame to the writer of
/// the client's connection and return.
#[async_trait]
pub trait ServerLink: Send + Sync {
    /// Starts listening on `port`, accepting connections under `path`.
    /// Returns once the listener is bound
    async fn start(&self, port: u16, path: &str) -> Result<(), LinkError>;

    /// Closes every connection and stops listening
    async fn stop(&self);

    /// Sends a single text frame to a client
    fn write(&self, client_id: &str, data: &[u8]) -> Result<(), LinkError>;

    fn set_message_handler(&self, handler: MessageHandler);

    fn set_new_client_handler(&self, handler: ClientHandler);

    fn set_disconnected_client_handler(&self, handler: ClientHandler);
}
