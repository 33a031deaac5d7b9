use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure the client can surface. Controllers never let one of these
/// escape: they end up as an inline [`Alert`](crate::client::models::ui_state::Alert).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Bad credentials or an expired session. Forces a logout.
    #[error("{0}")]
    Unauthorized(String),
    /// Rejected input, either by local checks or by the server (400).
    #[error("{message}")]
    Validation { message: String, payload: Option<Value> },
    #[error("{0}")]
    Forbidden(String),
    /// The record changed under us: already taken, already reviewed, gone.
    #[error("{0}")]
    Conflict(String),
    /// Network trouble or a 5xx; the next fetch is the retry.
    #[error("{0}")]
    Transient(String),
    #[error("unexpected response ({status}): {message}")]
    Api { status: u16, message: String, payload: Option<Value> },
    #[error("realtime: {0}")]
    Realtime(String),
    #[error("session storage: {0}")]
    Storage(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation { message: message.into(), payload: None }
    }

    /// Maps a non-2xx response onto the error taxonomy.
    pub fn from_status(status: u16, payload: Option<Value>, fallback: &str) -> Self {
        let message = payload
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| fallback.to_string());
        match status {
            400 | 422 => ClientError::Validation { message, payload },
            401 => ClientError::Unauthorized(message),
            403 => ClientError::Forbidden(message),
            404 | 409 => ClientError::Conflict(message),
            500..=599 => ClientError::Transient(message),
            _ => ClientError::Api { status, message, payload },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }

    /// Server payload attached to the error, if the server sent one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ClientError::Validation { payload, .. } | ClientError::Api { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// The plain user-facing text, without any prefix.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthorized(m)
            | ClientError::Forbidden(m)
            | ClientError::Conflict(m)
            | ClientError::Transient(m)
            | ClientError::Realtime(m)
            | ClientError::Storage(m)
            | ClientError::Decode(m) => m.clone(),
            ClientError::Validation { message, .. } | ClientError::Api { message, .. } => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transient(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Pulls a displayable message out of a DRF-style error body.
///
/// Looks at `detail`, `error`, `message` and finally joins every field error
/// (`{"email": ["already taken"], "password": ["too short"]}`) with spaces.
pub fn extract_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => {
            for key in ["detail", "error", "message"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return Some(s.clone());
                }
            }
            let parts: Vec<String> = map.values().filter_map(flatten_text).collect();
            if parts.is_empty() { None } else { Some(parts.join(" ")) }
        }
        Value::Array(_) => flatten_text(payload),
        _ => None,
    }
}

fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_text).collect();
            if parts.is_empty() { None } else { Some(parts.join(" ")) }
        }
        Value::Object(_) => extract_message(value),
        _ => None,
    }
}
