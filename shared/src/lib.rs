//! # OCPP-J Shared
//! Common functionality shared between ocppj-server & ocppj-client crates:
//! message framing and codec, payload validation, pending-request state,
//! bounded request queues and the feature catalog.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod codec;
mod config;
mod endpoint;
mod id_generator;
mod messages;
mod protocol;
mod queue;
mod state;
mod transport;
mod validation;

pub use codec::{
    escape_html, is_escape_html, serialize, serialize_call, serialize_call_error,
    serialize_call_result, set_escape_html,
};
pub use config::{DispatcherConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT};
pub use endpoint::Endpoint;
pub use id_generator::{IdGenerator, MessageIdGenerator, RandomIdGenerator};
pub use messages::{
    error::{CodecError, OcppError},
    error_code::{ErrorCode, ErrorCodeDialect},
    payload::{Payload, Request, Response},
    Call, CallError, CallResult, Message, MessageType, MAX_ID_LENGTH,
};
pub use protocol::{Catalog, CatalogError, Feature, FeatureDef, Profile};
pub use queue::{QueueError, RequestBundle, RequestCallback, RequestQueue};
pub use state::{ClientState, PendingRequest};
pub use transport::error::LinkError;
pub use validation::{
    is_validation_enabled, set_validation_enabled, CustomRule, FieldViolation, Requirable, Rule,
    Validate, ValidationContext, ValidationError, Validator,
};

pub use tokio_util::sync::CancellationToken;
