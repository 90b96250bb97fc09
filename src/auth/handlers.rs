use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::dto::{
    ChangeProfileRequest, CheckProfileRequest, LoginRequest, ProfileWithTokens, RefreshRequest,
    SignupRequest, UserProfile,
};
use crate::auth::service::NewProfile;
use crate::auth::signer::TokenPair;
use crate::error::ApiError;
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/users/me", post(view_profile).put(change_profile))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Shared input hygiene for signup and profile change; rejects before the
/// core is called.
fn check_profile_input(email: &str, password: &str) -> Result<(), ApiError> {
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    check_profile_input(&payload.email, &payload.password)?;

    let user = state
        .auth
        .signup(NewProfile {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = match state.auth.login(&payload.username, &payload.password).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(username = %payload.username, error = %err, "login rejected");
            return Err(err.into());
        }
    };

    info!(username = %payload.username, "user logged in");
    Ok(Json(pair))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = match state.auth.refresh(payload.id, &payload.refresh_token).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(user_id = %payload.id, error = %err, "refresh rejected");
            return Err(err.into());
        }
    };

    info!(user_id = %payload.id, "token pair rotated");
    Ok(Json(pair))
}

#[instrument(skip(state, payload))]
pub async fn view_profile(
    State(state): State<AppState>,
    Json(payload): Json<CheckProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .auth
        .check_access(payload.id, &payload.access_token)
        .await?;
    Ok(Json(UserProfile::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn change_profile(
    State(state): State<AppState>,
    Json(mut payload): Json<ChangeProfileRequest>,
) -> Result<Json<ProfileWithTokens>, ApiError> {
    payload.new_email = payload.new_email.trim().to_lowercase();
    check_profile_input(&payload.new_email, &payload.new_password)?;

    let (user, tokens) = state
        .auth
        .change_profile(
            payload.id,
            &payload.access_token,
            NewProfile {
                username: payload.new_username,
                email: payload.new_email,
                password: payload.new_password,
            },
        )
        .await?;

    info!(user_id = %user.id, username = %user.username, "profile updated");
    Ok(Json(ProfileWithTokens {
        profile: UserProfile::from(user),
        tokens,
    }))
}
