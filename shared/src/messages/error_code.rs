use std::fmt;

/// Error codes carried by a CallError frame.
///
/// Codes not known to this crate are preserved verbatim in [`ErrorCode::Other`],
/// so inbound errors from newer or non-conformant peers reach the application
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurrenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
    MessageTypeNotSupported,
    Other(String),
}

/// Which spelling to emit for a formation violation.
///
/// Historical peers expect `FormatViolation`, newer ones `FormationViolation`.
/// Both spellings are always accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCodeDialect {
    Legacy,
    #[default]
    Modern,
}

const FORMATION_VIOLATION: &str = "FormationViolation";
const FORMAT_VIOLATION: &str = "FormatViolation";

impl ErrorCode {
    /// Canonical (modern) spelling of the code
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::SecurityError => "SecurityError",
            ErrorCode::FormationViolation => FORMATION_VIOLATION,
            ErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            ErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ErrorCode::Other(code) => code.as_str(),
        }
    }

    /// Spelling to put on the wire for the given dialect
    pub fn wire_str(&self, dialect: ErrorCodeDialect) -> &str {
        match (self, dialect) {
            (ErrorCode::FormationViolation, ErrorCodeDialect::Legacy) => FORMAT_VIOLATION,
            _ => self.as_str(),
        }
    }

    /// Reads a code as received from the wire. Accepts both formation violation
    /// spellings, keeps unknown codes as they are.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NotImplemented" => ErrorCode::NotImplemented,
            "NotSupported" => ErrorCode::NotSupported,
            "InternalError" => ErrorCode::InternalError,
            "ProtocolError" => ErrorCode::ProtocolError,
            "SecurityError" => ErrorCode::SecurityError,
            FORMATION_VIOLATION | FORMAT_VIOLATION => ErrorCode::FormationViolation,
            "PropertyConstraintViolation" => ErrorCode::PropertyConstraintViolation,
            "OccurrenceConstraintViolation" => ErrorCode::OccurrenceConstraintViolation,
            "TypeConstraintViolation" => ErrorCode::TypeConstraintViolation,
            "GenericError" => ErrorCode::GenericError,
            "MessageTypeNotSupported" => ErrorCode::MessageTypeNotSupported,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ErrorCode::Other(_))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        ErrorCode::from_wire(code)
    }
}
