use thiserror::Error;

/// Message shown for any non-2xx response.
pub const TRANSPORT_MESSAGE: &str = "server response error";
/// Fallback when the backend reports failure without a message.
pub const APPLICATION_MESSAGE: &str = "API processing error";

/// Failure categories for a backend round trip.
///
/// `Display` is the user-facing string; the transport variant omits the
/// status code, which `status()` still exposes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("server response error")]
    Transport(u16),
    #[error("{0}")]
    Application(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Config(String),
}

impl FetchError {
    /// Application failure, substituting the generic message when the
    /// backend sent none.
    pub fn application(message: Option<&str>) -> Self {
        match message.map(str::trim) {
            Some(m) if !m.is_empty() => FetchError::Application(m.to_string()),
            _ => FetchError::Application(APPLICATION_MESSAGE.to_string()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Transport(status.as_u16()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_hides_status() {
        let err = FetchError::Transport(500);
        assert_eq!(err.to_string(), TRANSPORT_MESSAGE);
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn application_falls_back_on_blank_message() {
        assert_eq!(FetchError::application(Some("x")).to_string(), "x");
        assert_eq!(FetchError::application(Some("  ")).to_string(), APPLICATION_MESSAGE);
        assert_eq!(FetchError::application(None).to_string(), APPLICATION_MESSAGE);
    }
}
