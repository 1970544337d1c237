use std::{fmt, sync::Arc};

/// Produces ids for outbound Calls
pub trait MessageIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> MessageIdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Default generator: a random unsigned 32-bit integer rendered as decimal
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl MessageIdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        fastrand::u32(..).to_string()
    }
}

/// Shareable handle to a generator, defaulting to [`RandomIdGenerator`]
#[derive(Clone)]
pub struct IdGenerator(Arc<dyn MessageIdGenerator>);

impl IdGenerator {
    pub fn new<G: MessageIdGenerator + 'static>(generator: G) -> Self {
        Self(Arc::new(generator))
    }

    pub fn generate(&self) -> String {
        self.0.generate()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(RandomIdGenerator)
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdGenerator")
    }
}
