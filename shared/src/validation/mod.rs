//! Declarative field validation for payloads.
//!
//! Payload types describe their constraints by implementing [`Validate`],
//! calling rule methods on a [`ValidationContext`] for each field. Rule
//! failures are collected as [`FieldViolation`]s and translated into the
//! matching OCPP error code family.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

mod error;
mod rules;

pub use error::{FieldViolation, Rule, ValidationError};
pub use rules::Requirable;

use crate::messages::{error::OcppError, error_code::ErrorCode};

static VALIDATION_ENABLED: AtomicBool = AtomicBool::new(true);

static GLOBAL_VALIDATOR: Lazy<Validator> = Lazy::new(Validator::new);

/// Turns payload validation on or off for the whole process.
///
/// Meant as an escape hatch when talking to non-conformant peers.
pub fn set_validation_enabled(enabled: bool) {
    VALIDATION_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn is_validation_enabled() -> bool {
    VALIDATION_ENABLED.load(Ordering::SeqCst)
}

/// A named check over a string value, registered by feature modules
pub type CustomRule = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Implemented by every payload type that carries field constraints
pub trait Validate {
    fn validate(&self, ctx: &mut ValidationContext<'_>);

    /// Root of the dotted field path, e.g. `BootNotificationRequest`
    fn type_name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Holds the registry of custom rules and runs validations
pub struct Validator {
    rules: RwLock<HashMap<String, CustomRule>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide validator used by payloads
    pub fn global() -> &'static Validator {
        &GLOBAL_VALIDATOR
    }

    /// Registers a named rule, replacing any previous rule with the same name
    pub fn register_rule<F>(&self, name: &str, rule: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.rules.write().insert(name.to_string(), Arc::new(rule));
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.read().contains_key(name)
    }

    fn rule(&self, name: &str) -> Option<CustomRule> {
        self.rules.read().get(name).cloned()
    }

    /// Validates a value. Always succeeds while validation is disabled.
    pub fn validate<T: Validate + ?Sized>(&self, value: &T) -> Result<(), ValidationError> {
        if !is_validation_enabled() {
            return Ok(());
        }
        let mut ctx = ValidationContext::new(self, value.type_name());
        value.validate(&mut ctx);
        ctx.finish()
    }
}

/// Collects violations while walking a payload
pub struct ValidationContext<'v> {
    validator: &'v Validator,
    path: Vec<String>,
    violations: Vec<FieldViolation>,
}

impl<'v> ValidationContext<'v> {
    pub fn new(validator: &'v Validator, root: &str) -> Self {
        Self {
            validator,
            path: vec![root.to_string()],
            violations: Vec::new(),
        }
    }

    fn namespace(&self, field: &str) -> String {
        let mut namespace = self.path.join(".");
        if !field.is_empty() {
            namespace.push('.');
            namespace.push_str(field);
        }
        namespace
    }

    fn violation(&mut self, field: &str, rule: Rule, param: impl Display, actual: impl Display) {
        let namespace = self.namespace(field);
        self.violations.push(FieldViolation {
            namespace,
            rule,
            param: param.to_string(),
            actual: actual.to_string(),
        });
    }

    /// `required`: the value must be present / non-zero
    pub fn required<R: Requirable + ?Sized>(&mut self, field: &str, value: &R) -> &mut Self {
        if !value.is_present() {
            self.violation(field, Rule::Required, "", "");
        }
        self
    }

    /// `max=N` on a string length
    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        let len = value.chars().count();
        if len > max {
            self.violation(field, Rule::Max, max, len);
        }
        self
    }

    /// `min=N` on a string length
    pub fn min_len(&mut self, field: &str, value: &str, min: usize) -> &mut Self {
        let len = value.chars().count();
        if len < min {
            self.violation(field, Rule::Min, min, len);
        }
        self
    }

    /// `max=N` on a sequence length
    pub fn max_items<T>(&mut self, field: &str, items: &[T], max: usize) -> &mut Self {
        if items.len() > max {
            self.violation(field, Rule::Max, max, items.len());
        }
        self
    }

    /// `min=N` on a sequence length
    pub fn min_items<T>(&mut self, field: &str, items: &[T], min: usize) -> &mut Self {
        if items.len() < min {
            self.violation(field, Rule::Min, min, items.len());
        }
        self
    }

    pub fn gte<N: PartialOrd + Display>(&mut self, field: &str, value: N, bound: N) -> &mut Self {
        if !(value >= bound) {
            self.violation(field, Rule::Gte, bound, value);
        }
        self
    }

    pub fn gt<N: PartialOrd + Display>(&mut self, field: &str, value: N, bound: N) -> &mut Self {
        if !(value > bound) {
            self.violation(field, Rule::Gt, bound, value);
        }
        self
    }

    pub fn lte<N: PartialOrd + Display>(&mut self, field: &str, value: N, bound: N) -> &mut Self {
        if !(value <= bound) {
            self.violation(field, Rule::Lte, bound, value);
        }
        self
    }

    pub fn lt<N: PartialOrd + Display>(&mut self, field: &str, value: N, bound: N) -> &mut Self {
        if !(value < bound) {
            self.violation(field, Rule::Lt, bound, value);
        }
        self
    }

    /// Checks a value against a rule registered on the validator.
    /// Empty values are skipped; pair with `required` when mandatory.
    pub fn custom(&mut self, field: &str, rule: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        match self.validator.rule(rule) {
            Some(check) => {
                if !check(value) {
                    self.violation(field, Rule::Custom(rule.to_string()), rule, value);
                }
            }
            None => {
                self.violation(field, Rule::Unknown(rule.to_string()), rule, value);
            }
        }
        self
    }

    /// Validates a nested structure under `field`
    pub fn nested<T: Validate + ?Sized>(&mut self, field: &str, value: &T) -> &mut Self {
        self.path.push(field.to_string());
        value.validate(self);
        self.path.pop();
        self
    }

    /// Validates a nested structure under `field` if present
    pub fn nested_opt<T: Validate>(&mut self, field: &str, value: &Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.nested(field, value);
        }
        self
    }

    /// Validates each element of a sequence (`dive`)
    pub fn dive<T: Validate>(&mut self, field: &str, items: &[T]) -> &mut Self {
        for (index, item) in items.iter().enumerate() {
            self.path.push(format!("{}[{}]", field, index));
            item.validate(self);
            self.path.pop();
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("path", &self.path)
            .field("violations", &self.violations)
            .finish()
    }
}

impl ValidationError {
    /// Translates the first violation into a protocol error
    pub fn to_ocpp_error(&self, message_id: &str, feature: &str) -> OcppError {
        match self.violations.first() {
            Some(violation) => violation.to_ocpp_error(message_id, feature),
            None => OcppError::new(
                ErrorCode::GenericError,
                format!("Validation failed for feature {}", feature),
                message_id,
            ),
        }
    }
}
