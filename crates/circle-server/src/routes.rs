use anyhow::Context;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use circle_api::auth::{self, MAX_AVATAR_SIZE};
use circle_api::middleware::{decode_token, require_auth};
use circle_api::state::AppState;
use circle_api::media::MAX_IMAGE_SIZE;
use circle_api::{connections, media, notifications, posts, stories, users};
use circle_gateway::connection;

/// Assemble the full HTTP + websocket surface.
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> anyhow::Result<Router> {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/media/{key}", get(media::serve_media))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/check", get(auth::check_auth))
        .route(
            "/auth/update-profile",
            put(auth::update_profile).layer(DefaultBodyLimit::max(MAX_AVATAR_SIZE)),
        )
        .route("/connection/request/{to_user_id}", post(connections::request_connection))
        .route("/connection/accept/{to_user_id}", post(connections::accept_connection))
        .route("/connection/reject/{to_user_id}", post(connections::reject_connection))
        .route("/connection/cancel/{to_user_id}", post(connections::cancel_connection))
        .route("/connection/unfollow/{to_user_id}", post(connections::unfollow_connection))
        .route("/user/search", get(users::search_users))
        .route("/user/profile/{user_id}", get(users::get_profile))
        .route("/user/requests", get(users::incoming_requests))
        .route("/user/home-feed", get(posts::home_feed))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/post/create",
            post(posts::create_post).layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE)),
        )
        .route("/post/user/{user_id}", get(posts::list_user_posts))
        .route("/post/{post_id}", delete(posts::delete_post))
        .route(
            "/story/upload",
            post(stories::upload_story).layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE)),
        )
        .route("/story/list", get(stories::list_stories))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(cors_layer(cors_origin)?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("invalid CORS origin '{origin}'"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// The JWT is validated before the upgrade, so the socket loop starts with
/// a known user.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = decode_token(&state.jwt_secret, &query.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, claims.sub, claims.username)
    })
}
