use crate::auth::store::StoreError;

/// Outcome tags for every credential and token operation. The core returns
/// these untranslated; the HTTP boundary decides what each one looks like on
/// the wire.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user already exists")]
    DuplicateUser,

    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    InvalidPassword,

    #[error("access token expired")]
    AccessExpired,

    #[error("refresh token expired")]
    RefreshExpired,

    #[error("token mismatch")]
    TokenMismatch,

    /// Transient. The only variant a caller may retry with the same input.
    #[error("storage unavailable")]
    Storage(#[source] StoreError),

    #[error("token signing failed")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => AuthError::DuplicateUser,
            other => AuthError::Storage(other),
        }
    }
}
