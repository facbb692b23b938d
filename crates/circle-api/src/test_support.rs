use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use circle_db::Database;
use circle_db::models::NewUser;
use circle_gateway::Dispatcher;
use circle_types::api::Claims;

use crate::media::MediaStore;
use crate::middleware::{create_token, decode_token};
use crate::state::{AppState, AppStateInner};

pub const TEST_SECRET: &str = "test-secret";

/// In-memory database plus a throwaway media directory. Keep the `TempDir`
/// alive for as long as the state is used.
pub fn test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(
        dir.path().join("media"),
        "http://localhost:5001",
        TEST_SECRET.as_bytes(),
        3600,
    )
    .unwrap();

    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: TEST_SECRET.to_string(),
        dispatcher: Dispatcher::new(),
        media,
    });
    (state, dir)
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

impl TestUser {
    /// Insert a user directly, skipping password hashing.
    pub fn create(state: &AppState, name: &str) -> Self {
        let id = Uuid::new_v4();
        state
            .db
            .create_user(&NewUser {
                id: &id.to_string(),
                user_name: name,
                full_name: &format!("{name} tester"),
                email: &format!("{name}@gmail.com"),
                password_hash: "unused",
            })
            .unwrap()
            .unwrap();

        Self {
            id,
            token: create_token(TEST_SECRET, id, name).unwrap(),
        }
    }

    pub fn claims(&self) -> Claims {
        decode_token(TEST_SECRET, &self.token).unwrap()
    }
}
