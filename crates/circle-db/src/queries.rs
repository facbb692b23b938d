use crate::Database;
use crate::models::{ConnectionRow, NewUser, NotificationRow, PostRow, StoryRow, Taken, UserRow};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use circle_types::models::{ConnectionStatus, NotificationType};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, user_name, full_name, email, password, profile_pic, \
                            followers_count, followings_count, created_at";

const CONNECTION_COLUMNS: &str = "id, from_user_id, to_user_id, status, created_at, updated_at";

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.user_name, u.full_name, u.profile_pic,
                                  p.media_key, p.caption, p.created_at
                           FROM posts p
                           JOIN users u ON u.id = p.user_id";

const STORY_SELECT: &str = "SELECT s.id, s.user_id, u.user_name, u.full_name, u.profile_pic,
                                   s.media_key, s.created_at, s.expires_at
                            FROM stories s
                            JOIN users u ON u.id = s.user_id";

/// Timestamps are stored as RFC 3339 UTC with microseconds so they sort
/// lexicographically and can double as pagination cursors.
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    /// Insert a new account. A collision on the email or handle index comes
    /// back as `Ok(Err(Taken))`, so a signup that loses a race reads the
    /// same as one caught by the pre-insert lookup.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<std::result::Result<(), Taken>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, user_name, full_name, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    user.id,
                    user.user_name,
                    user.full_name,
                    user.email,
                    user.password_hash,
                    now_timestamp(),
                ),
            );

            match inserted {
                Ok(_) => Ok(Ok(())),
                Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    if msg.contains("users.email") {
                        Ok(Err(Taken::Email))
                    } else if msg.contains("users.user_name") {
                        Ok(Err(Taken::UserName))
                    } else {
                        Err(rusqlite::Error::SqliteFailure(e, Some(msg)).into())
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| find_user(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by(conn, "email", email))
    }

    pub fn get_user_by_username(&self, user_name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by(conn, "user_name", user_name))
    }

    /// Point the user's avatar at a new reference. Returns false if the user
    /// does not exist.
    pub fn set_profile_pic(&self, id: &str, profile_pic: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET profile_pic = ?2 WHERE id = ?1",
                (id, profile_pic),
            )?;
            Ok(changed == 1)
        })
    }

    /// Prefix search over handle and display name, case-insensitive.
    pub fn search_users(&self, query: &str, exclude_id: &str, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = format!("{}%", escape_like(query));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id <> ?2
                   AND (user_name LIKE ?1 ESCAPE '\\' OR full_name LIKE ?1 ESCAPE '\\')
                 ORDER BY user_name
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude_id, limit], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Connections --

    pub fn get_connection(&self, from_user_id: &str, to_user_id: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| find_connection(conn, from_user_id, to_user_id))
    }

    /// Users with a pending request towards `user_id`, oldest first.
    pub fn get_incoming_requests(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.user_name, u.full_name, u.email, u.password, u.profile_pic,
                        u.followers_count, u.followings_count, u.created_at
                 FROM connections c
                 JOIN users u ON u.id = c.from_user_id
                 WHERE c.to_user_id = ?1 AND c.status = 'requested'
                 ORDER BY c.updated_at",
            )?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    /// Newest first, ordered by `(created_at, id)` descending. The cursor is
    /// the `(created_at, id)` of the last row already seen; without an id it
    /// pages strictly older timestamps.
    pub fn get_notifications(
        &self,
        to_user_id: &str,
        limit: u32,
        before: Option<&str>,
        before_id: Option<&str>,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.to_user_id, n.from_user_id, u.user_name, u.full_name, u.profile_pic,
                        n.message, n.notification_type, n.created_at
                 FROM notifications n
                 JOIN users u ON u.id = n.from_user_id
                 WHERE n.to_user_id = ?1
                   AND (?2 IS NULL
                        OR n.created_at < ?2
                        OR (n.created_at = ?2 AND n.id < ?3))
                 ORDER BY n.created_at DESC, n.id DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![to_user_id, before, before_id, limit],
                    notification_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Posts --

    pub fn create_post(&self, id: &str, user_id: &str, media_key: &str, caption: &str) -> Result<PostRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, media_key, caption, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, media_key, caption, now_timestamp()),
            )?;
            find_post(conn, id)?.ok_or_else(|| anyhow!("post {id} vanished after insert"))
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| find_post(conn, id))
    }

    pub fn get_user_posts(&self, user_id: &str, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{POST_SELECT}
                 WHERE p.user_id = ?1
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Posts by `viewer_id` and by everyone whose edge from the viewer is
    /// `accepted`.
    pub fn get_feed(&self, viewer_id: &str, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{POST_SELECT}
                 WHERE p.user_id = ?1
                    OR p.user_id IN (SELECT to_user_id FROM connections
                                     WHERE from_user_id = ?1 AND status = 'accepted')
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![viewer_id, limit], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if there was no such post.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? == 1))
    }

    // -- Stories --

    pub fn create_story(&self, id: &str, user_id: &str, media_key: &str, ttl: Duration) -> Result<StoryRow> {
        let created_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (id, user_id, media_key, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, media_key, timestamp(created_at), timestamp(created_at + ttl)),
            )?;
            let row = conn
                .query_row(&format!("{STORY_SELECT} WHERE s.id = ?1"), [id], story_from_row)
                .optional()?;
            row.ok_or_else(|| anyhow!("story {id} vanished after insert"))
        })
    }

    /// The user's newest story still live at `now`.
    pub fn get_latest_story(&self, user_id: &str, now: &str) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "{STORY_SELECT}
                         WHERE s.user_id = ?1 AND s.expires_at > ?2
                         ORDER BY s.created_at DESC, s.id DESC
                         LIMIT 1"
                    ),
                    (user_id, now),
                    story_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// One story per followed user: their newest one still live at `now`.
    pub fn get_followed_stories(&self, viewer_id: &str, now: &str) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{STORY_SELECT}
                 WHERE s.expires_at > ?2
                   AND s.user_id IN (SELECT to_user_id FROM connections
                                     WHERE from_user_id = ?1 AND status = 'accepted')
                   AND NOT EXISTS (
                       SELECT 1 FROM stories newer
                       WHERE newer.user_id = s.user_id
                         AND newer.expires_at > ?2
                         AND (newer.created_at > s.created_at
                              OR (newer.created_at = s.created_at AND newer.id > s.id)))
                 ORDER BY s.created_at DESC, s.id DESC"
            ))?;
            let rows = stmt
                .query_map((viewer_id, now), story_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// Free functions below take a plain `&Connection` so they can run either
// standalone or inside `Database::with_tx` (a `Transaction` derefs to one).

pub fn find_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    query_user_by(conn, "id", id)
}

pub fn find_connection(
    conn: &Connection,
    from_user_id: &str,
    to_user_id: &str,
) -> Result<Option<ConnectionRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE from_user_id = ?1 AND to_user_id = ?2"
            ),
            (from_user_id, to_user_id),
            connection_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Create the edge or overwrite its status in place. Edges are never deleted.
pub fn write_connection(
    conn: &Connection,
    id: &str,
    from_user_id: &str,
    to_user_id: &str,
    status: ConnectionStatus,
) -> Result<ConnectionRow> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO connections (id, from_user_id, to_user_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(from_user_id, to_user_id)
         DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
        (id, from_user_id, to_user_id, status.as_str(), &now),
    )?;

    find_connection(conn, from_user_id, to_user_id)?
        .ok_or_else(|| anyhow!("connection {from_user_id} -> {to_user_id} vanished after write"))
}

/// Shift a user's follower/following counters. Counters never drop below zero.
pub fn adjust_follow_counts(
    conn: &Connection,
    user_id: &str,
    followers_delta: i64,
    followings_delta: i64,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users
         SET followers_count  = MAX(followers_count + ?2, 0),
             followings_count = MAX(followings_count + ?3, 0)
         WHERE id = ?1",
        (user_id, followers_delta, followings_delta),
    )?;
    anyhow::ensure!(changed == 1, "user {user_id} not found while adjusting counters");
    Ok(())
}

pub fn insert_notification(
    conn: &Connection,
    id: &str,
    to_user_id: &str,
    from_user_id: &str,
    kind: NotificationType,
) -> Result<NotificationRow> {
    conn.execute(
        "INSERT INTO notifications (id, to_user_id, from_user_id, message, notification_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (id, to_user_id, from_user_id, kind.message(), kind.as_str(), now_timestamp()),
    )?;

    find_notification(conn, id)?
        .ok_or_else(|| anyhow!("notification {id} vanished after insert"))
}

pub fn find_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let row = conn
        .query_row(
            "SELECT n.id, n.to_user_id, n.from_user_id, u.user_name, u.full_name, u.profile_pic,
                    n.message, n.notification_type, n.created_at
             FROM notifications n
             JOIN users u ON u.id = n.from_user_id
             WHERE n.id = ?1",
            [id],
            notification_from_row,
        )
        .optional()?;
    Ok(row)
}

fn find_post(conn: &Connection, id: &str) -> Result<Option<PostRow>> {
    let row = conn
        .query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), [id], post_from_row)
        .optional()?;
    Ok(row)
}

fn query_user_by(conn: &Connection, column: &'static str, value: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
            [value],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        user_name: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        profile_pic: row.get(5)?,
        followers_count: row.get(6)?,
        followings_count: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    let status: String = row.get(3)?;
    let status = status.parse::<ConnectionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ConnectionRow {
        id: row.get(0)?,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        status,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        to_user_id: row.get(1)?,
        from_user_id: row.get(2)?,
        from_user_name: row.get(3)?,
        from_full_name: row.get(4)?,
        from_profile_pic: row.get(5)?,
        message: row.get(6)?,
        notification_type: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_user_name: row.get(2)?,
        author_full_name: row.get(3)?,
        author_profile_pic: row.get(4)?,
        media_key: row.get(5)?,
        caption: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_user_name: row.get(2)?,
        author_full_name: row.get(3)?,
        author_profile_pic: row.get(4)?,
        media_key: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
