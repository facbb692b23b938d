//! Row -> wire conversions. Avatar references are resolved here so no
//! handler ever returns a raw storage key.

use anyhow::{Context, Result};
use uuid::Uuid;

use chrono::{DateTime, Utc};

use circle_db::models::{ConnectionRow, NotificationRow, PostRow, StoryRow, UserRow};
use circle_types::api::AccountView;
use circle_types::models::{EdgeStatus, Notification, Post, Story, UserProfile, UserSummary};

use crate::media::MediaStore;

pub fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{raw}'"))
}

pub fn profile(row: &UserRow, media: &MediaStore) -> Result<UserProfile> {
    Ok(UserProfile {
        id: parse_id(&row.id)?,
        user_name: row.user_name.clone(),
        full_name: row.full_name.clone(),
        profile_pic: media.display_url(row.profile_pic.as_deref()),
        followers_count: row.followers_count,
        followings_count: row.followings_count,
    })
}

pub fn account(row: &UserRow, media: &MediaStore) -> Result<AccountView> {
    Ok(AccountView {
        profile: profile(row, media)?,
        email: row.email.clone(),
    })
}

pub fn edge(row: &ConnectionRow) -> Result<EdgeStatus> {
    Ok(EdgeStatus {
        from_user_id: parse_id(&row.from_user_id)?,
        to_user_id: parse_id(&row.to_user_id)?,
        status: row.status,
    })
}

pub fn maybe_edge(row: Option<&ConnectionRow>) -> Result<Option<EdgeStatus>> {
    row.map(edge).transpose()
}

fn parse_time(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{raw}' on {what}"))?
        .with_timezone(&Utc))
}

fn summary(id: &str, user_name: &str, full_name: &str, pic: Option<&str>, media: &MediaStore) -> Result<UserSummary> {
    Ok(UserSummary {
        id: parse_id(id)?,
        user_name: user_name.to_string(),
        full_name: full_name.to_string(),
        profile_pic: media.display_url(pic),
    })
}

/// Posts and stories always carry a stored key, so a missing URL means a
/// corrupt row.
fn image_url(key: &str, media: &MediaStore) -> Result<String> {
    media
        .display_url(Some(key))
        .with_context(|| format!("empty media key '{key}'"))
}

pub fn post(row: &PostRow, media: &MediaStore) -> Result<Post> {
    Ok(Post {
        id: parse_id(&row.id)?,
        author: summary(
            &row.user_id,
            &row.author_user_name,
            &row.author_full_name,
            row.author_profile_pic.as_deref(),
            media,
        )?,
        image: image_url(&row.media_key, media)?,
        caption: row.caption.clone(),
        created_at: parse_time(&row.created_at, &format!("post {}", row.id))?,
    })
}

pub fn story(row: &StoryRow, media: &MediaStore) -> Result<Story> {
    let what = format!("story {}", row.id);
    Ok(Story {
        id: parse_id(&row.id)?,
        author: summary(
            &row.user_id,
            &row.author_user_name,
            &row.author_full_name,
            row.author_profile_pic.as_deref(),
            media,
        )?,
        image: image_url(&row.media_key, media)?,
        created_at: parse_time(&row.created_at, &what)?,
        expires_at: parse_time(&row.expires_at, &what)?,
    })
}

pub fn notification(row: &NotificationRow, media: &MediaStore) -> Result<Notification> {
    let created_at = parse_time(&row.created_at, &format!("notification {}", row.id))?;

    Ok(Notification {
        id: parse_id(&row.id)?,
        message: row.message.clone(),
        notification_type: row
            .notification_type
            .parse()
            .with_context(|| format!("notification {}", row.id))?,
        from_user: summary(
            &row.from_user_id,
            &row.from_user_name,
            &row.from_full_name,
            row.from_profile_pic.as_deref(),
            media,
        )?,
        to_user_id: parse_id(&row.to_user_id)?,
        created_at,
    })
}
