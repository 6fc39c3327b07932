use atelier_contracts::generation::ValidationError;
use thiserror::Error;

/// Everything a generation call can fail with. Each variant renders as a
/// single user-facing message.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key is required")]
    MissingCredential,
    /// Network failure or non-2xx reply. `message` is the service's own
    /// message when it sent one.
    #[error("{message}")]
    TransportFailure {
        status: Option<u16>,
        message: String,
    },
    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("init image is not valid base64: {0}")]
    InvalidImage(#[from] base64::DecodeError),
}

impl GenerationError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        GenerationError::TransportFailure {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GenerationError::TransportFailure { status, .. } => *status,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedResponse {
    #[error("No image was generated")]
    NoArtifact,
    #[error("The service returned an empty image")]
    EmptyImage,
    #[error("Unexpected response from image service: {0}")]
    InvalidJson(String),
}

/// Prompt-list edits that name a prompt that is not there, or carry a value
/// that fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("there is no prompt #{0}")]
    NoSuchPrompt(usize),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
