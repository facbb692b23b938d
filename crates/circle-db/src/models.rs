use circle_types::models::ConnectionStatus;

/// Database row types, one per SQLite table shape.
/// Distinct from circle-types API models to keep the DB layer independent.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub user_name: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    /// Storage key or absolute URL; resolved to a display URL by the API.
    pub profile_pic: Option<String>,
    pub followers_count: i64,
    pub followings_count: i64,
    pub created_at: String,
}

/// The unique handle a signup collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taken {
    Email,
    UserName,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub user_name: &'a str,
    pub full_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone)]
pub struct ConnectionRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: ConnectionStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Notification joined with the display fields of its source user.
#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub to_user_id: String,
    pub from_user_id: String,
    pub from_user_name: String,
    pub from_full_name: String,
    pub from_profile_pic: Option<String>,
    pub message: String,
    pub notification_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub author_user_name: String,
    pub author_full_name: String,
    pub author_profile_pic: Option<String>,
    pub media_key: String,
    pub caption: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StoryRow {
    pub id: String,
    pub user_id: String,
    pub author_user_name: String,
    pub author_full_name: String,
    pub author_profile_pic: Option<String>,
    pub media_key: String,
    pub created_at: String,
    pub expires_at: String,
}
