use crate::messages::Msg;

/// Errors surfaced by every collaborator call and local computation.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No credential, or the credential has expired.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Session is valid but the account has not been approved.
    #[error("account has not been approved")]
    NotApproved,

    #[error("email address is not verified")]
    EmailNotVerified,

    /// Administrative action attempted without the admin role.
    #[error("administrator role required")]
    Forbidden,

    /// A required form field is missing or invalid.
    #[error("validation failed: {0:?}")]
    Validation(Msg),

    /// Network failure or server-side error.
    #[error("remote service unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    #[error("invalid timestamp `{value}`")]
    InvalidTimestamp { value: String },

    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend rejected the call with a client error.
    #[error("request rejected ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("session storage: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Message that describes this error on its own, independent of the action
    /// that failed. `None` means the action's failure text should be shown.
    pub fn message(&self) -> Option<Msg> {
        match self {
            AppError::AuthenticationRequired => Some(Msg::AuthenticationRequired),
            AppError::NotApproved => Some(Msg::EmailNotApproved),
            AppError::EmailNotVerified => Some(Msg::EmailNotVerified),
            AppError::Forbidden => Some(Msg::AdminRequired),
            AppError::Validation(msg) => Some(*msg),
            AppError::RemoteUnavailable { .. } => Some(Msg::RemoteUnavailable),
            AppError::InvalidTimestamp { .. } => Some(Msg::InvalidTimestamp),
            AppError::Conflict(_) => Some(Msg::Conflict),
            AppError::Remote { .. } | AppError::Malformed(_) | AppError::Io(_) => None,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::RemoteUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Malformed(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
