//! # OCPP-J Server
//! The central system side of OCPP-J: accepts connections from many charging
//! stations, dispatches requests to each of them in order with response
//! timeouts, and routes inbound frames to application handlers tagged with
//! the id of the client they came from.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub mod transport;
pub mod shared {
    pub use ocppj_shared::{
        set_escape_html, set_validation_enabled, CancellationToken, DispatcherConfig,
        ErrorCode, ErrorCodeDialect, IdGenerator, LinkError, OcppError, Profile, Request,
        RequestCallback, Response,
    };
}

mod dispatcher;
mod error;
mod queue_map;
mod server;
mod server_state;

pub use dispatcher::{RequestCanceledHandler, ServerDispatcher};
pub use error::OcppServerError;
pub use queue_map::QueueMap;
pub use server::{
    ErrorHandler, InvalidMessageHook, RequestHandler, ResponseHandler, Server, ServerConfig,
};
pub use server_state::ServerState;
