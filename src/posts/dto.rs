use serde::{Deserialize, Serialize};

use crate::posts::repo::Post;

/// Creating a post needs a live access token; the id rides along because the
/// token alone does not identify the caller.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub id: i64,
    pub access_token: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct PostList {
    pub posts: Vec<Post>,
}
