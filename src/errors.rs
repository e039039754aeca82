use thiserror::Error;

use crate::models::entity::EntityKind;
use crate::workflow::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum BackofficeError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("a reason is required to {0}")]
    ReasonRequired(&'static str),

    #[error("record is already approved")]
    AlreadyApproved,

    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: EntityKind,
        operation: &'static str,
    },

    #[error("a request is already in flight")]
    Busy,

    #[error("dialog is not open")]
    NotOpen,

    #[error("backend rejected the request: {0}")]
    Mutation(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("file rejected: {0}")]
    Attachment(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest_middleware::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = BackofficeError> = std::result::Result<T, E>;

impl BackofficeError {
    /// Short message suitable for an inline alert or a transient notice.
    ///
    /// Expected failures are reported verbatim. Anything unexpected is logged
    /// and collapsed into a generic message.
    pub fn user_message(&self) -> String {
        match self {
            BackofficeError::NotFound(id) => format!("Record {} could not be found.", id),
            BackofficeError::Validation(errors) => {
                format!("Please correct the highlighted fields ({}).", errors.len())
            }
            BackofficeError::ReasonRequired(action) => {
                format!("Please provide a reason to {}.", action)
            }
            BackofficeError::AlreadyApproved => "This record has already been approved.".into(),
            BackofficeError::Unsupported { kind, operation } => {
                format!("{} is not available for {}.", operation, kind.descriptor().label)
            }
            BackofficeError::Busy => "Please wait for the current request to finish.".into(),
            BackofficeError::NotOpen => "Nothing is selected.".into(),
            BackofficeError::Mutation(msg) => msg.clone(),
            BackofficeError::Attachment(msg) => msg.clone(),
            BackofficeError::Status { status, .. } if *status == 401 || *status == 403 => {
                "You are not allowed to perform this action.".into()
            }
            BackofficeError::Status { status, body } => {
                tracing::error!(status, body = %body, "backend request failed");
                "The server could not complete the request. Please try again.".into()
            }
            BackofficeError::Http(e) => {
                tracing::error!("HTTP error: {}", e);
                "Could not reach the server. Please try again.".into()
            }
            BackofficeError::Transport(e) => {
                tracing::error!("Transport error: {}", e);
                "Could not reach the server. Please try again.".into()
            }
            BackofficeError::Decode(e) => {
                tracing::error!("Decode error: {}", e);
                "Something went wrong. Please try again.".into()
            }
            BackofficeError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Something went wrong. Please try again.".into()
            }
        }
    }

    /// True for failures where pressing "retry" can plausibly help.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackofficeError::Http(_) | BackofficeError::Transport(_) => true,
            BackofficeError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
