use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use circle_db::models::{ConnectionRow, PostRow};
use circle_types::api::{Claims, MessageResponse, PostQuery, PostResponse, PostsResponse};
use circle_types::models::{ConnectionStatus, Post};

use crate::error::ApiError;
use crate::media::check_upload;
use crate::state::{AppState, run_blocking};
use crate::views;

const MAX_CAPTION_CHARS: usize = 2200;
const PAGE_SIZE: u32 = 50;

/// A profile's posts are visible to its owner and to viewers whose follow
/// request was accepted.
fn can_see_posts(viewer_id: &str, owner_id: &str, edge: Option<&ConnectionRow>) -> bool {
    viewer_id == owner_id || edge.is_some_and(|e| e.status == ConnectionStatus::Accepted)
}

fn to_posts(rows: &[PostRow], state: &AppState) -> Result<Vec<Post>, ApiError> {
    Ok(rows
        .iter()
        .map(|row| views::post(row, &state.media))
        .collect::<anyhow::Result<Vec<Post>>>()?)
}

/// POST /post/create?caption=..: the body is the raw image.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<PostQuery>, QueryRejection>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    check_upload(&bytes)?;

    let caption = query.caption.trim().to_string();
    if caption.chars().count() > MAX_CAPTION_CHARS {
        return Err(ApiError::Validation(format!(
            "Caption must be at most {MAX_CAPTION_CHARS} characters."
        )));
    }

    let key = state.media.save(&bytes).await?;
    let post_id = Uuid::new_v4().to_string();
    let author = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        Ok(s.db.create_post(&post_id, &author, &key, &caption)?)
    })
    .await?;

    info!("{} ({}) published post {}", claims.username, claims.sub, row.id);
    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Post uploaded.".into(),
            post: views::post(&row, &state.media)?,
        }),
    ))
}

/// GET /post/user/{user_id}
pub async fn list_user_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner: Uuid = user_id.parse().map_err(|_| ApiError::invalid_request())?;
    let viewer = claims.sub.to_string();
    let owner = owner.to_string();

    let rows = run_blocking(&state, move |s| {
        if s.db.get_user_by_id(&owner)?.is_none() {
            return Err(ApiError::user_not_found());
        }
        let edge = s.db.get_connection(&viewer, &owner)?;
        if !can_see_posts(&viewer, &owner, edge.as_ref()) {
            return Ok(Vec::new());
        }
        Ok(s.db.get_user_posts(&owner, PAGE_SIZE)?)
    })
    .await?;

    Ok(Json(PostsResponse {
        posts: to_posts(&rows, &state)?,
    }))
}

/// DELETE /post/{post_id}: author only.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id: Uuid = post_id.parse().map_err(|_| ApiError::invalid_request())?;
    let caller = claims.sub.to_string();
    let post_key = post_id.to_string();

    let row = run_blocking(&state, move |s| {
        let row = s.db.get_post(&post_key)?.ok_or(ApiError::NotFound)?;
        if row.user_id != caller {
            return Err(ApiError::Forbidden);
        }
        if !s.db.delete_post(&post_key)? {
            return Err(ApiError::NotFound);
        }
        Ok(row)
    })
    .await?;

    if let Err(e) = state.media.remove(&row.media_key).await {
        warn!("Post {} deleted but its image {} was not: {:#}", row.id, row.media_key, e);
    }

    info!("{} ({}) deleted post {}", claims.username, claims.sub, row.id);
    Ok(Json(MessageResponse {
        message: "Post deleted.".into(),
    }))
}

/// GET /user/home-feed: own posts plus those of everyone the caller follows.
pub async fn home_feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let rows = run_blocking(&state, move |s| Ok(s.db.get_feed(&viewer, PAGE_SIZE)?)).await?;

    Ok(Json(PostsResponse {
        posts: to_posts(&rows, &state)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Response;
    use circle_types::connection::ConnectionOp;

    use crate::service;
    use crate::test_support::{TestUser, test_state};

    async fn json_of(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn publish(state: &AppState, author: &TestUser, caption: &str) -> Post {
        let query = PostQuery {
            caption: caption.into(),
        };
        let resp = create_post(
            State(state.clone()),
            Extension(author.claims()),
            Ok(Query(query)),
            Bytes::from_static(b"\x89PNGimage"),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        serde_json::from_value(json_of(resp).await["post"].clone()).unwrap()
    }

    async fn visible_posts(state: &AppState, viewer: &TestUser, owner: &TestUser) -> Vec<Post> {
        let resp = list_user_posts(State(state.clone()), Extension(viewer.claims()), Path(owner.id.to_string()))
            .await
            .unwrap()
            .into_response();
        serde_json::from_value(json_of(resp).await["posts"].clone()).unwrap()
    }

    async fn step(state: &AppState, op: ConnectionOp, caller: &TestUser, counterpart: &TestUser) {
        let expected = Some(op.target_status().as_str().to_string());
        service::perform(state, op, caller.id, counterpart.id, expected, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn posts_follow_the_accepted_edge() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");
        let bob = TestUser::create(&state, "bob");

        let post = publish(&state, &ann, "  sunset  ").await;
        assert_eq!(post.caption, "sunset");
        assert_eq!(post.author.id, ann.id);
        assert!(post.image.contains("/media/"));

        assert_eq!(visible_posts(&state, &ann, &ann).await.len(), 1);
        assert!(visible_posts(&state, &bob, &ann).await.is_empty());

        step(&state, ConnectionOp::Request, &bob, &ann).await;
        assert!(visible_posts(&state, &bob, &ann).await.is_empty());

        step(&state, ConnectionOp::Accept, &ann, &bob).await;
        let seen = visible_posts(&state, &bob, &ann).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, post.id);

        // ann following bob back is not needed for bob to see ann's posts
        assert!(visible_posts(&state, &ann, &bob).await.is_empty());

        step(&state, ConnectionOp::Unfollow, &bob, &ann).await;
        assert!(visible_posts(&state, &bob, &ann).await.is_empty());
    }

    #[tokio::test]
    async fn rejected_requester_sees_nothing() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");
        let bob = TestUser::create(&state, "bob");
        publish(&state, &ann, "").await;

        step(&state, ConnectionOp::Request, &bob, &ann).await;
        step(&state, ConnectionOp::Reject, &ann, &bob).await;
        assert!(visible_posts(&state, &bob, &ann).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_owner_is_a_validation_error() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");

        let err = list_user_posts(State(state), Extension(ann.claims()), Path(Uuid::new_v4().to_string()))
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.to_string(), "User not found.");
    }

    #[tokio::test]
    async fn uploads_are_checked() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");

        let empty = create_post(
            State(state.clone()),
            Extension(ann.claims()),
            Ok(Query(PostQuery::default())),
            Bytes::new(),
        )
        .await
        .map(|_| ())
        .unwrap_err();
        assert_eq!(empty.to_string(), "Image is required.");

        let long = PostQuery {
            caption: "x".repeat(MAX_CAPTION_CHARS + 1),
        };
        let err = create_post(
            State(state),
            Extension(ann.claims()),
            Ok(Query(long)),
            Bytes::from_static(b"img"),
        )
        .await
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn only_the_author_deletes() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");
        let bob = TestUser::create(&state, "bob");
        publish(&state, &ann, "mine").await;

        let row = state.db.get_user_posts(&ann.id.to_string(), 10).unwrap().remove(0);
        assert!(state.media.load(&row.media_key).await.unwrap().is_some());

        let err = delete_post(State(state.clone()), Extension(bob.claims()), Path(row.id.clone()))
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        delete_post(State(state.clone()), Extension(ann.claims()), Path(row.id.clone()))
            .await
            .map(|_| ())
            .unwrap();
        assert!(state.media.load(&row.media_key).await.unwrap().is_none());

        let again = delete_post(State(state), Extension(ann.claims()), Path(row.id))
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(again, ApiError::NotFound));
    }

    #[tokio::test]
    async fn feed_mixes_own_and_followed_posts() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");
        let bob = TestUser::create(&state, "bob");
        let cat = TestUser::create(&state, "cat");

        publish(&state, &ann, "ann").await;
        publish(&state, &bob, "bob").await;
        publish(&state, &cat, "cat").await;

        step(&state, ConnectionOp::Request, &ann, &bob).await;
        step(&state, ConnectionOp::Accept, &bob, &ann).await;
        step(&state, ConnectionOp::Request, &ann, &cat).await;

        let resp = home_feed(State(state.clone()), Extension(ann.claims()))
            .await
            .unwrap()
            .into_response();
        let feed: PostsResponse = serde_json::from_value(json_of(resp).await).unwrap();
        let mut captions: Vec<_> = feed.posts.iter().map(|p| p.caption.as_str()).collect();
        captions.sort();
        assert_eq!(captions, vec!["ann", "bob"]);
    }
}
