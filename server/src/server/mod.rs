mod server;
pub use server::{ErrorHandler, InvalidMessageHook, RequestHandler, ResponseHandler, Server};

mod server_config;
pub use server_config::ServerConfig;
