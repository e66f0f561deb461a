use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    /// Transport failure, including non-2xx responses.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("translation service returned no text")]
    EmptyResult,
}

impl From<serde_json::Error> for TranslateError {
    fn from(e: serde_json::Error) -> Self {
        TranslateError::Parse(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("failed to register global hotkey: {0}")]
    Registration(String),

    #[error("global hotkeys are not supported on this platform")]
    Unsupported,
}
