#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ocppj_shared::{
    Call, Endpoint, ErrorCodeDialect, Profile, Request, RequestBundle, Response, Validate,
    ValidationContext,
};

pub const ECHO: &str = "Echo";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub repeat: i64,
}

impl EchoRequest {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            repeat: 1,
        }
    }
}

impl Validate for EchoRequest {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("Text", &self.text)
            .max_len("Text", &self.text, 40)
            .gte("Repeat", self.repeat, 0);
    }
}

impl Request for EchoRequest {
    fn feature_name(&self) -> &'static str {
        ECHO
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    #[serde(default)]
    pub text: String,
}

impl Validate for EchoResponse {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("Text", &self.text);
    }
}

impl Response for EchoResponse {
    fn feature_name(&self) -> &'static str {
        ECHO
    }
}

pub fn echo_profile() -> Profile {
    Profile::new("Echo")
        .add_feature::<EchoRequest, EchoResponse>(ECHO)
        .build()
}

pub fn endpoint() -> Endpoint {
    endpoint_with_dialect(ErrorCodeDialect::Modern)
}

pub fn endpoint_with_dialect(dialect: ErrorCodeDialect) -> Endpoint {
    let mut endpoint = Endpoint::new(dialect);
    endpoint
        .add_profile(echo_profile())
        .expect("echo profile composes");
    endpoint
}

pub fn bundle(id: &str) -> RequestBundle {
    let call = Call::new(id, Arc::new(EchoRequest::new(id)));
    let data = ocppj_shared::serialize_call(&call).expect("serializable");
    RequestBundle::new(call, data)
}
