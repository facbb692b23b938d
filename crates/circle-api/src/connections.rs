use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use circle_types::api::{CancelRequest, Claims, StatusQuery};
use circle_types::connection::ConnectionOp;

use crate::error::ApiError;
use crate::service;
use crate::state::AppState;

fn parse_target(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_request())
}

async fn handle(
    state: AppState,
    op: ConnectionOp,
    claims: Claims,
    to_user_id: String,
    query: StatusQuery,
    from_self_profile: bool,
) -> Result<impl IntoResponse, ApiError> {
    let to_user_id = parse_target(&to_user_id)?;
    let response = service::perform(
        &state,
        op,
        claims.sub,
        to_user_id,
        query.status,
        from_self_profile,
    )
    .await?;
    Ok(Json(response))
}

/// POST /connection/request/{to_user_id}?status=requested
pub async fn request_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(to_user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    handle(state, ConnectionOp::Request, claims, to_user_id, query, false).await
}

/// POST /connection/accept/{to_user_id}?status=accepted
pub async fn accept_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(to_user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    handle(state, ConnectionOp::Accept, claims, to_user_id, query, false).await
}

/// POST /connection/reject/{to_user_id}?status=rejected
pub async fn reject_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(to_user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    handle(state, ConnectionOp::Reject, claims, to_user_id, query, false).await
}

/// POST /connection/cancel/{to_user_id}?status=cancelled
///
/// Body `{ "fromSelfProfile": bool }` is optional; an empty body means false.
pub async fn cancel_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(to_user_id): Path<String>,
    Query(query): Query<StatusQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid_request())?
    };
    handle(state, ConnectionOp::Cancel, claims, to_user_id, query, req.from_self_profile).await
}

/// POST /connection/unfollow/{to_user_id}?status=unfollowed
pub async fn unfollow_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(to_user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    handle(state, ConnectionOp::Unfollow, claims, to_user_id, query, false).await
}
