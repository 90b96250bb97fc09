use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::signer::TokenPair;
use crate::auth::store::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for token rotation. The id travels alongside the token
/// because the token itself is never decoded.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub id: i64,
    pub refresh_token: String,
}

/// Request body for viewing the profile.
#[derive(Debug, Deserialize)]
pub struct CheckProfileRequest {
    pub id: i64,
    pub access_token: String,
}

/// Request body for changing the profile.
#[derive(Debug, Deserialize)]
pub struct ChangeProfileRequest {
    pub id: i64,
    pub access_token: String,
    pub new_username: String,
    pub new_email: String,
    pub new_password: String,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: user.created_at,
        }
    }
}

/// Response for a profile change: the updated profile together with the
/// token pair re-keyed to it.
#[derive(Debug, Serialize)]
pub struct ProfileWithTokens {
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}
