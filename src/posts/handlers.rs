use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::posts::dto::{CreatePostRequest, PostList};
use crate::posts::repo::{self, Post};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/:id", get(get_post))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/posts", post(create_post))
}

#[instrument(skip(state))]
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<PostList>, ApiError> {
    let posts = repo::list_all(&state.db).await?;
    Ok(Json(PostList { posts }))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    let post = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(post))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let author = match state
        .auth
        .check_access(payload.id, &payload.access_token)
        .await
    {
        Ok(user) => user,
        Err(err) => {
            warn!(user_id = %payload.id, error = %err, "post creation rejected");
            return Err(err.into());
        }
    };

    let post = repo::insert(
        &state.db,
        &payload.title,
        &payload.description,
        &author.username,
    )
    .await?;

    info!(post_id = %post.id, author = %author.username, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}
