use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                TEXT PRIMARY KEY,
            user_name         TEXT NOT NULL UNIQUE COLLATE NOCASE,
            full_name         TEXT NOT NULL,
            email             TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password          TEXT NOT NULL,
            profile_pic       TEXT,
            followers_count   INTEGER NOT NULL DEFAULT 0,
            followings_count  INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_full_name
            ON users(full_name COLLATE NOCASE);

        -- One directed edge per ordered pair; the reverse pair is its own row.
        CREATE TABLE IF NOT EXISTS connections (
            id            TEXT PRIMARY KEY,
            from_user_id  TEXT NOT NULL REFERENCES users(id),
            to_user_id    TEXT NOT NULL REFERENCES users(id),
            status        TEXT NOT NULL CHECK (status IN
                              ('requested', 'accepted', 'rejected', 'cancelled', 'unfollowed')),
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            UNIQUE(from_user_id, to_user_id),
            CHECK (from_user_id <> to_user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_connections_to_status
            ON connections(to_user_id, status);

        CREATE TABLE IF NOT EXISTS notifications (
            id                 TEXT PRIMARY KEY,
            to_user_id         TEXT NOT NULL REFERENCES users(id),
            from_user_id       TEXT NOT NULL REFERENCES users(id),
            message            TEXT NOT NULL,
            notification_type  TEXT NOT NULL,
            created_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_to_user
            ON notifications(to_user_id, created_at);

        -- media_key points into the media store, never a URL
        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            media_key   TEXT NOT NULL,
            caption     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_user
            ON posts(user_id, created_at);

        CREATE TABLE IF NOT EXISTS stories (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            media_key   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_stories_user
            ON stories(user_id, expires_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
