use std::fmt;

use thiserror::Error;

use crate::messages::{error::OcppError, error_code::ErrorCode};

/// The rule a field failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Required,
    Max,
    Min,
    Gte,
    Gt,
    Lte,
    Lt,
    /// A rule registered by a feature module
    Custom(String),
    /// A rule name nobody registered
    Unknown(String),
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => f.write_str("required"),
            Rule::Max => f.write_str("max"),
            Rule::Min => f.write_str("min"),
            Rule::Gte => f.write_str("gte"),
            Rule::Gt => f.write_str("gt"),
            Rule::Lte => f.write_str("lte"),
            Rule::Lt => f.write_str("lt"),
            Rule::Custom(name) | Rule::Unknown(name) => f.write_str(name),
        }
    }
}

/// A single failed constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted field path, rooted at the payload type name
    pub namespace: String,
    pub rule: Rule,
    /// Rule parameter, e.g. the `N` of `max=N`
    pub param: String,
    /// Observed length or value
    pub actual: String,
}

impl FieldViolation {
    pub fn to_ocpp_error(&self, message_id: &str, feature: &str) -> OcppError {
        let ns = &self.namespace;
        let param = &self.param;
        let actual = &self.actual;
        let (code, description) = match &self.rule {
            Rule::Required => (
                ErrorCode::OccurrenceConstraintViolation,
                format!("Field {ns} required but not found for feature {feature}"),
            ),
            Rule::Max => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be maximum {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Min => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be minimum {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Gte => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be >= {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Gt => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be > {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Lte => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be <= {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Lt => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} must be < {param}, but was {actual} for feature {feature}"),
            ),
            Rule::Custom(rule) => (
                ErrorCode::PropertyConstraintViolation,
                format!("Field {ns} violates {rule} constraint, value {actual} is not allowed for feature {feature}"),
            ),
            Rule::Unknown(rule) => (
                ErrorCode::GenericError,
                format!("Field {ns} is checked against unknown constraint {rule} for feature {feature}"),
            ),
        };
        OcppError::new(code, description, message_id)
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.param.is_empty() {
            write!(f, "{} failed on '{}'", self.namespace, self.rule)
        } else {
            write!(
                f,
                "{} failed on '{}={}' (was {})",
                self.namespace, self.rule, self.param, self.actual
            )
        }
    }
}

/// Every constraint a payload failed, in field order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Payload validation failed: {}", .violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}
