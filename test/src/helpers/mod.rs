use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::Value;

use ocppj_client::{Client, ClientConfig};
use ocppj_server::{Server, ServerConfig};
use ocppj_shared::{DispatcherConfig, IdGenerator};

use crate::{
    local_link::{LocalClientLink, LocalServerLink},
    test_protocol::core_profile,
};

pub const TEST_URL: &str = "ws://localhost:8887/ocpp";
pub const TEST_PORT: u16 = 8887;
pub const TEST_PATH: &str = "/ocpp";

/// Installs env_logger once, honouring RUST_LOG
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ids "1", "2", ... so frames can be asserted literally
pub fn sequential_ids() -> IdGenerator {
    let counter = AtomicU64::new(0);
    IdGenerator::new(move || (counter.fetch_add(1, Ordering::SeqCst) + 1).to_string())
}

pub fn dispatcher_config(timeout: Duration, capacity: usize) -> DispatcherConfig {
    DispatcherConfig {
        request_timeout: timeout,
        queue_capacity: capacity,
    }
}

pub fn client_config(dispatcher: DispatcherConfig) -> ClientConfig {
    ClientConfig {
        dispatcher,
        id_generator: sequential_ids(),
        ..Default::default()
    }
}

pub fn server_config(dispatcher: DispatcherConfig) -> ServerConfig {
    ServerConfig {
        dispatcher,
        id_generator: sequential_ids(),
        ..Default::default()
    }
}

/// A client with the core profile over a local link. Not started
pub fn test_client(id: &str, link: &LocalClientLink, dispatcher: DispatcherConfig) -> Client {
    match Client::new(id, Arc::new(link.clone()), client_config(dispatcher), vec![core_profile()]) {
        Ok(client) => client,
        Err(err) => panic!("failed to build client {}: {}", id, err),
    }
}

/// A server with the core profile over a local link. Not started
pub fn test_server(link: &LocalServerLink, dispatcher: DispatcherConfig) -> Server {
    match Server::new(Arc::new(link.clone()), server_config(dispatcher), vec![core_profile()]) {
        Ok(server) => server,
        Err(err) => panic!("failed to build server: {}", err),
    }
}

/// Collects values produced by handlers
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: T) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Polls `condition` until it holds or `limit` elapses. Returns whether it held
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let step = Duration::from_millis(5);
    let mut waited = Duration::ZERO;
    loop {
        if condition() {
            return true;
        }
        if waited >= limit {
            return false;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
}

/// Lets spawned delivery and pump tasks run to quiescence
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Decodes a recorded frame
pub fn frame(text: &str) -> Value {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => panic!("invalid frame {}: {}", text, err),
    }
}

/// Recorded frames whose type tag is `tag`
pub fn frames_of_type(frames: &[String], tag: u64) -> Vec<Value> {
    frames
        .iter()
        .map(|text| frame(text))
        .filter(|value| value.get(0).and_then(Value::as_u64) == Some(tag))
        .collect()
}
