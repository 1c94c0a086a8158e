//! The backend's uniform `{status: {code, message}, result}` wrapper.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

pub const SUCCESS: &str = "SUCCESS";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(default)]
    pub result: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.status.code == SUCCESS
    }

    /// The `result` payload, or the application error the status describes.
    pub fn into_result(self) -> Result<Value, FetchError> {
        if self.is_success() {
            Ok(self.result)
        } else {
            Err(FetchError::application(self.status.message.as_deref()))
        }
    }
}

/// Classify a raw HTTP response: non-2xx is a transport failure, otherwise
/// the body must be an envelope whose status code is `SUCCESS`.
pub fn unwrap_response(status: u16, body: &[u8]) -> Result<Value, FetchError> {
    if !(200..300).contains(&status) {
        return Err(FetchError::Transport(status));
    }
    let envelope: Envelope = serde_json::from_slice(body)?;
    envelope.into_result()
}
