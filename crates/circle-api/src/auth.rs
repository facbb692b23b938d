use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use circle_db::models::{NewUser, Taken};
use circle_types::api::{AuthResponse, Claims, LoginRequest, MessageResponse, SignupRequest};

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::state::{AppState, run_blocking};
use crate::views;

/// Largest avatar accepted by `update_profile`.
pub const MAX_AVATAR_SIZE: usize = crate::media::MAX_IMAGE_SIZE;

fn invalid(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

/// `^[a-zA-Z0-9._%+-]+@gmail\.com$`
fn is_valid_email(email: &str) -> bool {
    email.strip_suffix("@gmail.com").is_some_and(|local| {
        !local.is_empty()
            && local
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
    })
}

fn validate_signup(req: &SignupRequest) -> Result<(), ApiError> {
    if req.full_name.is_empty() || req.user_name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(invalid("Fill all fields."));
    }

    let full_name_len = req.full_name.chars().count();
    if full_name_len < 4 {
        return Err(invalid("Fullname must be at least 4 characters."));
    }
    if full_name_len > 40 {
        return Err(invalid("Fullname must be less than 40 characters."));
    }

    let user_name_len = req.user_name.chars().count();
    if !(3..=32).contains(&user_name_len)
        || !req
            .user_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(invalid(
            "Username must be 3-32 characters of letters, digits, '.' or '_'.",
        ));
    }

    if !is_valid_email(&req.email) {
        return Err(invalid("Invalid email."));
    }

    let password_len = req.password.chars().count();
    if password_len < 6 {
        return Err(invalid("Password must be at least 6 characters."));
    }
    if password_len > 40 {
        return Err(invalid("Password must be less than 40 characters."));
    }

    Ok(())
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    validate_signup(&req)?;

    let user_id = Uuid::new_v4();
    let row = run_blocking(&state, move |s| {
        if s.db.get_user_by_email(&req.email)?.is_some() {
            return Err(invalid("Email already exist."));
        }
        if s.db.get_user_by_username(&req.user_name)?.is_some() {
            return Err(invalid("Username already taken."));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let created = s.db.create_user(&NewUser {
            id: &user_id.to_string(),
            user_name: &req.user_name,
            full_name: &req.full_name,
            email: &req.email,
            password_hash: &password_hash,
        })?;
        match created {
            Ok(()) => {}
            Err(Taken::Email) => return Err(invalid("Email already exist.")),
            Err(Taken::UserName) => return Err(invalid("Username already taken.")),
        }

        s.db.get_user_by_id(&user_id.to_string())?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {user_id} missing after insert")))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &row.user_name)?;
    info!("New account {} ({})", row.user_name, user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: views::account(&row, &state.media)?,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    if req.email.is_empty() || req.password.is_empty() {
        return Err(invalid("Fill all fields."));
    }
    if !is_valid_email(&req.email) {
        return Err(invalid("Invalid email."));
    }

    let row = run_blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_email(&req.email)?
            .ok_or_else(|| invalid("Invalid credentials."))?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash for {} unreadable: {}", user.id, e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| invalid("Invalid credentials."))?;

        Ok(user)
    })
    .await?;

    let user_id = views::parse_id(&row.id)?;
    let token = create_token(&state.jwt_secret, user_id, &row.user_name)?;

    Ok(Json(AuthResponse {
        token,
        user: views::account(&row, &state.media)?,
    }))
}

/// POST /auth/logout: tokens are stateless; the client discards its copy.
pub async fn logout() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Logged out successfully.".into(),
    })
}

/// GET /auth/check
pub async fn check_auth(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        s.db.get_user_by_id(&user_id)?.ok_or(ApiError::Unauthorized)
    })
    .await?;

    Ok(Json(views::account(&row, &state.media)?))
}

/// PUT /auth/update-profile: raw image bytes become the new avatar.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(invalid("Profile image is required."));
    }
    if bytes.len() > MAX_AVATAR_SIZE {
        return Err(ApiError::PayloadTooLarge);
    }

    let key = state.media.save(&bytes).await?;

    let user_id = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        if !s.db.set_profile_pic(&user_id, &key)? {
            return Err(ApiError::Unauthorized);
        }
        s.db.get_user_by_id(&user_id)?.ok_or(ApiError::Unauthorized)
    })
    .await?;

    info!("{} ({}) updated their avatar", row.user_name, row.id);
    Ok(Json(views::account(&row, &state.media)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestUser, test_state};

    fn signup_req(full_name: &str, user_name: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            full_name: full_name.into(),
            user_name: user_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_must_be_gmail() {
        assert!(is_valid_email("ann.lee+x@gmail.com"));
        assert!(!is_valid_email("@gmail.com"));
        assert!(!is_valid_email("ann@example.com"));
        assert!(!is_valid_email("ann lee@gmail.com"));
    }

    #[test]
    fn signup_rules() {
        let ok = signup_req("Ann Lee", "ann.lee", "ann@gmail.com", "secret1");
        assert!(validate_signup(&ok).is_ok());

        let cases = [
            (signup_req("", "ann", "ann@gmail.com", "secret1"), "Fill all fields."),
            (signup_req("Ann", "ann", "ann@gmail.com", "secret1"), "Fullname must be at least 4 characters."),
            (signup_req(&"x".repeat(41), "ann", "ann@gmail.com", "secret1"), "Fullname must be less than 40 characters."),
            (signup_req("Ann Lee", "a!", "ann@gmail.com", "secret1"), "Username must be 3-32 characters of letters, digits, '.' or '_'."),
            (signup_req("Ann Lee", "ann", "ann@yahoo.com", "secret1"), "Invalid email."),
            (signup_req("Ann Lee", "ann", "ann@gmail.com", "short"), "Password must be at least 6 characters."),
            (signup_req("Ann Lee", "ann", "ann@gmail.com", &"p".repeat(41)), "Password must be less than 40 characters."),
        ];
        for (req, message) in cases {
            assert_eq!(validate_signup(&req).unwrap_err().to_string(), message);
        }
    }

    #[tokio::test]
    async fn signup_then_login() {
        let (state, _dir) = test_state();

        let req = signup_req("Ann Lee", "ann", "ann@gmail.com", "secret1");
        signup(State(state.clone()), Ok(Json(req))).await.map(|_| ()).unwrap();

        let dup = signup_req("Ann Again", "ann2", "ANN@gmail.com", "secret1");
        let err = signup(State(state.clone()), Ok(Json(dup))).await.map(|_| ()).unwrap_err();
        assert_eq!(err.to_string(), "Email already exist.");

        let good = LoginRequest {
            email: "ann@gmail.com".into(),
            password: "secret1".into(),
        };
        assert!(login(State(state.clone()), Ok(Json(good))).await.is_ok());

        let bad = LoginRequest {
            email: "ann@gmail.com".into(),
            password: "wrong-password".into(),
        };
        let err = login(State(state), Ok(Json(bad))).await.map(|_| ()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials.");
    }

    async fn post_json(state: AppState, uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        use axum::{Router, body::Body, http::Request, routing::post};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/auth/signup", post(signup))
            .route("/auth/login", post(login))
            .with_state(state);
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_fields_answer_fill_all_fields() {
        let (state, _dir) = test_state();

        let (status, body) = post_json(
            state.clone(),
            "/auth/signup",
            r#"{"fullName":"Ann Lee","userName":"ann","email":"ann@gmail.com"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Fill all fields.");

        let (status, body) = post_json(state.clone(), "/auth/login", r#"{"email":"ann@gmail.com"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Fill all fields.");

        // extra fields are ignored
        let (status, _) = post_json(
            state.clone(),
            "/auth/signup",
            r#"{"fullName":"Ann Lee","userName":"ann","email":"ann@gmail.com","password":"secret1","theme":"dark"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = post_json(state, "/auth/signup", "fullName=Ann").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request.");
    }

    #[tokio::test]
    async fn taken_handle_is_a_validation_error() {
        let (state, _dir) = test_state();
        TestUser::create(&state, "ann");

        let req = signup_req("Ann Other", "ANN", "other@gmail.com", "secret1");
        let err = signup(State(state), Ok(Json(req))).await.map(|_| ()).unwrap_err();
        assert_eq!(err.to_string(), "Username already taken.");
    }

    #[tokio::test]
    async fn avatar_upload_sets_a_signed_url() {
        let (state, _dir) = test_state();
        let ann = TestUser::create(&state, "ann");
        let claims = Claims {
            sub: ann.id,
            username: "ann".into(),
            exp: 0,
        };

        let empty = update_profile(State(state.clone()), Extension(claims.clone()), Bytes::new())
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(empty, ApiError::Validation(_)));

        update_profile(State(state.clone()), Extension(claims), Bytes::from_static(b"\xFF\xD8\xFFjpeg"))
            .await
            .map(|_| ())
            .unwrap();

        let row = state.db.get_user_by_id(&ann.id.to_string()).unwrap().unwrap();
        let key = row.profile_pic.clone().unwrap();
        let profile = views::profile(&row, &state.media).unwrap();
        let url = profile.profile_pic.unwrap();
        assert!(url.contains(&format!("/media/{key}?expires=")));
        assert!(state.media.load(&key).await.unwrap().is_some());
    }
}
