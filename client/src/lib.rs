//! # OCPP-J Client
//! The charging station side of an OCPP-J connection: a single link to the
//! central system, ordered request dispatch with response timeouts, and
//! routing of inbound Calls to application handlers.

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

mod client;
mod client_config;
mod dispatcher;
mod error;

pub use client::{Client, ErrorHandler, InvalidMessageHook, RequestHandler, ResponseHandler};
pub use client_config::{ClientConfig, DEFAULT_STOP_TIMEOUT};
pub use dispatcher::{ClientDispatcher, RequestCanceledHandler};
pub use error::OcppClientError;
