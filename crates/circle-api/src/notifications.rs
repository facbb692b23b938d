use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
    response::IntoResponse,
};

use circle_types::api::{Claims, NotificationQuery};
use circle_types::models::Notification;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};
use crate::views;

const MAX_PAGE: u32 = 200;

/// GET /notifications?limit=..&before=..&beforeId=..: newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<NotificationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let caller = claims.sub.to_string();
    let limit = query.limit.min(MAX_PAGE);

    let rows = run_blocking(&state, move |s| {
        Ok(s.db.get_notifications(
            &caller,
            limit,
            query.before.as_deref(),
            query.before_id.as_deref(),
        )?)
    })
    .await?;

    let notifications = rows
        .iter()
        .map(|row| views::notification(row, &state.media))
        .collect::<anyhow::Result<Vec<Notification>>>()?;
    Ok(Json(notifications))
}
