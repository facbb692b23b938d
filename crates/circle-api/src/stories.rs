use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Duration;
use tracing::info;
use uuid::Uuid;

use circle_db::queries::now_timestamp;
use circle_types::api::{Claims, StoriesResponse, StoryResponse};
use circle_types::models::Story;

use crate::error::ApiError;
use crate::media::check_upload;
use crate::state::{AppState, run_blocking};
use crate::views;

const STORY_LIFETIME_HOURS: i64 = 24;

/// POST /story/upload: the body is the raw image.
pub async fn upload_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    check_upload(&bytes)?;

    let key = state.media.save(&bytes).await?;
    let story_id = Uuid::new_v4().to_string();
    let author = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        Ok(s.db.create_story(&story_id, &author, &key, Duration::hours(STORY_LIFETIME_HOURS))?)
    })
    .await?;

    info!("{} ({}) posted story {}", claims.username, claims.sub, row.id);
    Ok((
        StatusCode::CREATED,
        Json(StoryResponse {
            message: "Story uploaded.".into(),
            story: views::story(&row, &state.media)?,
        }),
    ))
}

/// GET /story/list
pub async fn list_stories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let (followed, mine) = run_blocking(&state, move |s| {
        let now = now_timestamp();
        let followed = s.db.get_followed_stories(&viewer, &now)?;
        let mine = s.db.get_latest_story(&viewer, &now)?;
        Ok((followed, mine))
    })
    .await?;

    let stories = followed
        .iter()
        .map(|row| views::story(row, &state.media))
        .collect::<anyhow::Result<Vec<Story>>>()?;
    let my_story = mine
        .as_ref()
        .map(|row| views::story(row, &state.media))
        .transpose()?;

    Ok(Json(StoriesResponse { stories, my_story }))
}
