//! Structured errors for record/playback failures

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ObjectNotFound,
    IncompleteNaming,
    UnhandledCommand,
    CommandFailed,
    MalformedRecord,
    ReentrancyViolation,
    Io,
    Unknown,
}

impl ErrorCode {
    /// Codes that end a playback session as soon as they occur.
    pub fn is_session_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::ObjectNotFound
                | ErrorCode::UnhandledCommand
                | ErrorCode::CommandFailed
                | ErrorCode::MalformedRecord
        )
    }
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn object_not_found(path: &str) -> Self {
        Self::new(
            ErrorCode::ObjectNotFound,
            format!("Couldn't find object `{}`", path),
        )
    }

    pub fn incomplete_naming(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::IncompleteNaming, reason)
    }

    pub fn unhandled_command(path: &str, command: &str) -> Self {
        Self::new(
            ErrorCode::UnhandledCommand,
            format!("No player handled command `{}` on `{}`", command, path),
        )
    }

    pub fn command_failed(path: &str, command: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::CommandFailed,
            format!("Command `{}` on `{}` failed: {}", command, path, reason),
        )
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRecord, reason)
    }

    pub fn reentrancy() -> Self {
        Self::new(
            ErrorCode::ReentrancyViolation,
            "A playback session is already active on this event loop",
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_code_in_screaming_case() {
        let e = Error::unhandled_command("root/x", "frobnicate");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["code"], "UNHANDLED_COMMAND");
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn fatal_codes() {
        assert!(ErrorCode::ObjectNotFound.is_session_fatal());
        assert!(ErrorCode::MalformedRecord.is_session_fatal());
        assert!(!ErrorCode::ReentrancyViolation.is_session_fatal());
        assert!(!ErrorCode::IncompleteNaming.is_session_fatal());
    }
}
