//! Unified error handling with a consistent JSON envelope for command output.

use serde::Serialize;

/// Error detail in the command response envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Consistent JSON envelope for all `--json` command output.
#[derive(Debug, Serialize)]
pub struct CommandResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> CommandResponse<T> {
    /// Wrap a successful result in the envelope.
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Wrap an error in the envelope.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

impl CommandResponse<()> {
    /// Build an error envelope from a checklist error.
    pub fn from_error(err: &ChecklistError) -> Self {
        Self::error(err.code(), &err.to_string())
    }
}

/// Errors raised while parsing benchmarks, loading snapshots, or applying directives.
#[derive(Debug, thiserror::Error)]
pub enum ChecklistError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ChecklistError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Format(_) => "FORMAT_ERROR",
            Self::Io(_) | Self::Csv(_) => "IO_ERROR",
        }
    }

    /// Check if this error represents a missing snapshot file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error represents a rejected directive value.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_response_success() {
        let response = CommandResponse::success("hello");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], "hello");
        assert!(json["error"].is_null());
    }

    #[test]
    fn command_response_error() {
        let err = ChecklistError::NotFound("checklist.cklb".to_string());
        let response = CommandResponse::from_error(&err);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Not found: checklist.cklb");
    }

    #[test]
    fn checklist_error_predicates() {
        let err = ChecklistError::Validation("bad status".to_string());
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn checklist_error_display() {
        let err = ChecklistError::Parse("unexpected end of document".to_string());
        assert_eq!(err.to_string(), "Parse error: unexpected end of document");
    }

    #[test]
    fn checklist_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ChecklistError = io_err.into();
        assert!(matches!(err, ChecklistError::Io(_)));
        assert_eq!(err.code(), "IO_ERROR");
    }
}
