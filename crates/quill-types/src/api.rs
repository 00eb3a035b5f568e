use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Post;

// -- JWT Claims --

/// JWT claims shared between quill-auth (minting/verification) and quill-api
/// (identity middleware). Canonical definition lives here in quill-types to
/// eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyOtpRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<crate::models::User> for UserResponse {
    fn from(user: crate::models::User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Shared shape for signUp / verify-otp / signIn. The sign-in response
/// carries no message, so it is skipped when absent.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Posts --

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author_id: Uuid,
    pub author_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub is_owner: bool,
}

impl PostResponse {
    /// Project a post for a viewer; `is_owner` is false for anonymous viewers.
    pub fn for_viewer(post: Post, viewer: Option<Uuid>) -> Self {
        let is_owner = viewer == Some(post.author_id);
        Self {
            id: post.id,
            title: post.title,
            description: post.description,
            content: post.content,
            image_url: post.image_url,
            author_id: post.author_id,
            author_name: post.author_name,
            created_at: post.created_at,
            updated_at: post.updated_at,
            is_owner,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_count: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub blogs: Vec<PostResponse>,
    pub pagination: Pagination,
}
