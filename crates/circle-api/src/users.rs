use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use circle_types::api::{Claims, ProfileResponse, SearchQuery};
use circle_types::models::UserProfile;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};
use crate::views;

const SEARCH_LIMIT: u32 = 20;

/// GET /user/search?searchQuery=..
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let needle = query.search_query.trim().to_string();
    if needle.is_empty() {
        return Ok(Json(Vec::<UserProfile>::new()));
    }

    let caller = claims.sub.to_string();
    let rows = run_blocking(&state, move |s| {
        Ok(s.db.search_users(&needle, &caller, SEARCH_LIMIT)?)
    })
    .await?;

    let profiles = rows
        .iter()
        .map(|row| views::profile(row, &state.media))
        .collect::<anyhow::Result<Vec<UserProfile>>>()?;
    Ok(Json(profiles))
}

/// GET /user/profile/{user_id}: profile plus both edges relative to the caller.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let target: Uuid = user_id.parse().map_err(|_| ApiError::invalid_request())?;
    let caller = claims.sub.to_string();
    let target_key = target.to_string();

    let (row, forward, reverse) = run_blocking(&state, move |s| {
        let row = s.db.get_user_by_id(&target_key)?.ok_or_else(ApiError::user_not_found)?;
        let forward = s.db.get_connection(&caller, &target_key)?;
        let reverse = s.db.get_connection(&target_key, &caller)?;
        Ok((row, forward, reverse))
    })
    .await?;

    Ok(Json(ProfileResponse {
        user_data: views::profile(&row, &state.media)?,
        connection_data: views::maybe_edge(forward.as_ref())?,
        rev_connection_data: views::maybe_edge(reverse.as_ref())?,
    }))
}

/// GET /user/requests: who is waiting for the caller to answer.
pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub.to_string();
    let rows = run_blocking(&state, move |s| Ok(s.db.get_incoming_requests(&caller)?)).await?;

    let profiles = rows
        .iter()
        .map(|row| views::profile(row, &state.media))
        .collect::<anyhow::Result<Vec<UserProfile>>>()?;
    Ok(Json(profiles))
}
