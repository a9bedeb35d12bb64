use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Unsupported,
    ResourceExhausted,
    Unavailable,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unsupported => "UNSUPPORTED",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

/// Implemented by every crate-local error enum so callers at the transport
/// boundary can map to a status family without matching on variants.
pub trait HavenError: std::error::Error {
    fn error_code(&self) -> ErrorCode;
}

/// Truncates a message to at most `len` bytes at a char boundary, for
/// terminal `IngestionStatus::Error` messages (capped at 200 chars).
pub fn truncate_message(message: &str, len: usize) -> String {
    if message.len() <= len {
        return message.to_string();
    }
    let mut end = len;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}
