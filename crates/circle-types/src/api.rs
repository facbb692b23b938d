use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EdgeStatus, Post, Story, UserProfile};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

/// Missing fields deserialize as empty strings so validation, not the JSON
/// extractor, decides the error message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The caller's own account: public profile plus the private fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Connections --

/// `?status=` echoed by the client; must match the operation's target status.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub from_self_profile: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub message: String,
    pub user_data: UserProfile,
    /// caller -> counterpart
    pub connection_data: Option<EdgeStatus>,
    /// counterpart -> caller
    pub rev_connection_data: Option<EdgeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_to_remove_id: Option<Uuid>,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub search_query: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_data: UserProfile,
    pub connection_data: Option<EdgeStatus>,
    pub rev_connection_data: Option<EdgeStatus>,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: the `createdAt` of the oldest notification already shown.
    pub before: Option<String>,
    /// Its `id`, so rows sharing that timestamp are not skipped.
    pub before_id: Option<String>,
}

fn default_limit() -> u32 {
    50
}

// -- Posts & stories --

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub message: String,
    pub post: Post,
}

/// A profile's posts or the home feed, newest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryResponse {
    pub message: String,
    pub story: Story,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoriesResponse {
    /// Latest live story of each followed user, newest first.
    pub stories: Vec<Story>,
    pub my_story: Option<Story>,
}

// -- Media --

#[derive(Debug, Deserialize)]
pub struct SignedMediaQuery {
    pub expires: i64,
    pub signature: String,
}
