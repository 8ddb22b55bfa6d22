use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict("Unique constraint violated".to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT DEFAULT '',
                bio TEXT DEFAULT '',
                avatar_url TEXT DEFAULT '',
                is_public INTEGER DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vinyls (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                artist TEXT NOT NULL,
                title TEXT NOT NULL,
                year INTEGER,
                barcode TEXT,
                format TEXT NOT NULL DEFAULT 'vinyl',
                cover_url TEXT DEFAULT '',
                notes TEXT DEFAULT '',
                gifted_by TEXT,
                shared_with TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id),
                UNIQUE(follower_id, following_id)
            );

            CREATE TABLE IF NOT EXISTS likes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                vinyl_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (vinyl_id) REFERENCES vinyls(id) ON DELETE CASCADE,
                UNIQUE(user_id, vinyl_id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                vinyl_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                parent_id TEXT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (vinyl_id) REFERENCES vinyls(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS comment_likes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                comment_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE,
                UNIQUE(user_id, comment_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                type TEXT NOT NULL,
                reference_id TEXT,
                is_read INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (sender_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                p256dh TEXT NOT NULL,
                auth TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(user_id, endpoint)
            );

            CREATE INDEX IF NOT EXISTS idx_vinyls_user_id ON vinyls(user_id);
            CREATE INDEX IF NOT EXISTS idx_vinyls_created_at ON vinyls(created_at);
            CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_id);
            CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);
            CREATE INDEX IF NOT EXISTS idx_likes_vinyl ON likes(vinyl_id);
            CREATE INDEX IF NOT EXISTS idx_comments_vinyl ON comments(vinyl_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_push_subs_user ON push_subscriptions(user_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, email, password_hash, display_name, bio,
                avatar_url, is_public, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.display_name,
                &user.bio,
                &user.avatar_url,
                user.is_public,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], |row| {
            row_to_user(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            |row| row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.updated_at = Utc::now();

        let rows = conn.execute(
            r#"UPDATE users SET display_name = ?1, bio = ?2, avatar_url = ?3,
               is_public = ?4, updated_at = ?5 WHERE id = ?6"#,
            params![
                &user.display_name,
                &user.bio,
                &user.avatar_url,
                user.is_public,
                user.updated_at.to_rfc3339(),
                &user.id,
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", user.id)));
        }
        Ok(())
    }

    pub fn search_users(&self, query: &str, limit: i64) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", query);
        let mut stmt = conn.prepare(
            r#"SELECT id, username, display_name, avatar_url, is_public FROM users
               WHERE username LIKE ?1 OR display_name LIKE ?1
               ORDER BY username ASC LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![pattern, limit], |row| row_to_user_summary(row))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ==================== Vinyl Operations ====================

    pub fn create_vinyl(&self, vinyl: &mut Vinyl) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        vinyl.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        vinyl.created_at = now;
        vinyl.updated_at = now;

        conn.execute(
            r#"INSERT INTO vinyls (id, user_id, artist, title, year, barcode, format,
                cover_url, notes, gifted_by, shared_with, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                &vinyl.id,
                &vinyl.user_id,
                &vinyl.artist,
                &vinyl.title,
                vinyl.year,
                &vinyl.barcode,
                &vinyl.format,
                &vinyl.cover_url,
                &vinyl.notes,
                &vinyl.gifted_by,
                &vinyl.shared_with,
                vinyl.created_at.to_rfc3339(),
                vinyl.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_vinyl(&self, id: &str) -> StoreResult<Vinyl> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM vinyls WHERE id = ?1", params![id], |row| {
            row_to_vinyl(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Vinyl {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn update_vinyl(&self, vinyl: &mut Vinyl) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        vinyl.updated_at = Utc::now();

        let rows = conn.execute(
            r#"UPDATE vinyls SET artist = ?1, title = ?2, year = ?3, barcode = ?4,
               format = ?5, cover_url = ?6, notes = ?7, gifted_by = ?8, shared_with = ?9,
               updated_at = ?10 WHERE id = ?11"#,
            params![
                &vinyl.artist,
                &vinyl.title,
                vinyl.year,
                &vinyl.barcode,
                &vinyl.format,
                &vinyl.cover_url,
                &vinyl.notes,
                &vinyl.gifted_by,
                &vinyl.shared_with,
                vinyl.updated_at.to_rfc3339(),
                &vinyl.id,
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("Vinyl {}", vinyl.id)));
        }
        Ok(())
    }

    /// Hard delete; likes, comments and comment likes go with it via cascade.
    pub fn delete_vinyl(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM vinyls WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Vinyl {}", id)));
        }
        Ok(())
    }

    pub fn list_vinyls(&self, user_id: &str, limit: i64, offset: i64) -> StoreResult<Vec<Vinyl>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM vinyls WHERE user_id = ?1
               ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt.query_map(params![user_id, limit, offset], |row| row_to_vinyl(row))?;

        let mut vinyls = Vec::new();
        for row in rows {
            vinyls.push(row?);
        }
        Ok(vinyls)
    }

    pub fn count_vinyls(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vinyls WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Follow Operations ====================

    pub fn create_follow(&self, follow: &mut Follow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        follow.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        follow.created_at = now;
        follow.updated_at = now;

        conn.execute(
            r#"INSERT INTO follows (id, follower_id, following_id, status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &follow.id,
                &follow.follower_id,
                &follow.following_id,
                follow.status.as_str(),
                follow.created_at.to_rfc3339(),
                follow.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_follow(&self, follower_id: &str, following_id: &str) -> StoreResult<Follow> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
            |row| row_to_follow(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Follow".to_string()),
            _ => StoreError::Database(e),
        })
    }

    /// Transition a pending edge to accepted. Returns the number of rows
    /// updated: zero when no pending edge exists, which callers treat as a
    /// silent no-op.
    pub fn accept_follow(&self, follower_id: &str, following_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"UPDATE follows SET status = 'accepted', updated_at = ?1
               WHERE follower_id = ?2 AND following_id = ?3 AND status = 'pending'"#,
            params![Utc::now().to_rfc3339(), follower_id, following_id],
        )?;
        Ok(rows)
    }

    /// Unconditional edge delete; used by both reject and unfollow.
    pub fn delete_follow(&self, follower_id: &str, following_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
        )?;
        Ok(rows)
    }

    pub fn is_following_accepted(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            r#"SELECT EXISTS(SELECT 1 FROM follows
               WHERE follower_id = ?1 AND following_id = ?2 AND status = 'accepted')"#,
            params![follower_id, following_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Incoming pending follow requests for a user, newest first.
    pub fn list_pending_requests(&self, user_id: &str) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT u.id, u.username, u.display_name, u.avatar_url, u.is_public
               FROM follows f JOIN users u ON u.id = f.follower_id
               WHERE f.following_id = ?1 AND f.status = 'pending'
               ORDER BY f.created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row_to_user_summary(row))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn list_followers(&self, user_id: &str) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT u.id, u.username, u.display_name, u.avatar_url, u.is_public
               FROM follows f JOIN users u ON u.id = f.follower_id
               WHERE f.following_id = ?1 AND f.status = 'accepted'
               ORDER BY f.created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row_to_user_summary(row))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn list_following(&self, user_id: &str) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT u.id, u.username, u.display_name, u.avatar_url, u.is_public
               FROM follows f JOIN users u ON u.id = f.following_id
               WHERE f.follower_id = ?1 AND f.status = 'accepted'
               ORDER BY f.created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row_to_user_summary(row))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn count_followers(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1 AND status = 'accepted'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_following(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND status = 'accepted'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Like Operations ====================

    pub fn has_liked(&self, user_id: &str, vinyl_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND vinyl_id = ?2)",
            params![user_id, vinyl_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn create_like(&self, like: &mut Like) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        like.id = Uuid::new_v4().to_string();
        like.created_at = Utc::now();

        conn.execute(
            "INSERT INTO likes (id, user_id, vinyl_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &like.id,
                &like.user_id,
                &like.vinyl_id,
                like.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_like(&self, user_id: &str, vinyl_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND vinyl_id = ?2",
            params![user_id, vinyl_id],
        )?;
        Ok(rows)
    }

    pub fn count_likes(&self, vinyl_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE vinyl_id = ?1",
            params![vinyl_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Comment Operations ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        comment.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO comments (id, vinyl_id, user_id, parent_id, content, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &comment.id,
                &comment.vinyl_id,
                &comment.user_id,
                &comment.parent_id,
                &comment.content,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_comment(&self, id: &str) -> StoreResult<Comment> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM comments WHERE id = ?1", params![id], |row| {
            row_to_comment(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Comment {}", id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn delete_comment(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }
        Ok(())
    }

    /// Comments for a vinyl joined with author fields and the viewer's
    /// comment-like state, oldest first so threads read top down.
    pub fn list_comments(&self, vinyl_id: &str, viewer_id: &str) -> StoreResult<Vec<CommentView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.vinyl_id, c.user_id, c.parent_id, c.content, c.created_at,
                      u.username, u.display_name, u.avatar_url,
                      (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS like_count,
                      EXISTS(SELECT 1 FROM comment_likes cl
                             WHERE cl.comment_id = c.id AND cl.user_id = ?2) AS has_liked
               FROM comments c JOIN users u ON u.id = c.user_id
               WHERE c.vinyl_id = ?1
               ORDER BY c.created_at ASC, c.id ASC"#,
        )?;
        let rows = stmt.query_map(params![vinyl_id, viewer_id], |row| row_to_comment_view(row))?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    pub fn count_comments(&self, vinyl_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE vinyl_id = ?1",
            params![vinyl_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Comment Like Operations ====================

    pub fn has_liked_comment(&self, user_id: &str, comment_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM comment_likes WHERE user_id = ?1 AND comment_id = ?2)",
            params![user_id, comment_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn create_comment_like(&self, like: &mut CommentLike) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        like.id = Uuid::new_v4().to_string();
        like.created_at = Utc::now();

        conn.execute(
            "INSERT INTO comment_likes (id, user_id, comment_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &like.id,
                &like.user_id,
                &like.comment_id,
                like.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_comment_like(&self, user_id: &str, comment_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM comment_likes WHERE user_id = ?1 AND comment_id = ?2",
            params![user_id, comment_id],
        )?;
        Ok(rows)
    }

    pub fn count_comment_likes(&self, comment_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Notification Operations ====================

    pub fn create_notification(&self, notification: &Notification) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO notifications (id, user_id, sender_id, type, reference_id, is_read, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &notification.id,
                &notification.user_id,
                &notification.sender_id,
                notification.kind.as_str(),
                &notification.reference_id,
                notification.is_read,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_notifications(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NotificationView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT n.id, n.sender_id, n.type, n.reference_id, n.is_read, n.created_at,
                      u.username, u.display_name, u.avatar_url
               FROM notifications n JOIN users u ON u.id = n.sender_id
               WHERE n.user_id = ?1
               ORDER BY n.created_at DESC, n.id DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt.query_map(params![user_id, limit, offset], |row| {
            row_to_notification_view(row)
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    pub fn count_notifications(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Scoped by recipient so a user cannot mark another user's rows.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows)
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
        )?;
        Ok(rows)
    }

    pub fn delete_notification(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Notification {}", id)));
        }
        Ok(())
    }

    // ==================== Push Subscription Operations ====================

    /// Upsert keyed on (user, endpoint): re-subscribing refreshes the keys.
    pub fn upsert_push_subscription(&self, sub: &mut PushSubscription) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        sub.id = Uuid::new_v4().to_string();
        sub.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(user_id, endpoint) DO UPDATE SET p256dh = ?4, auth = ?5"#,
            params![
                &sub.id,
                &sub.user_id,
                &sub.endpoint,
                &sub.p256dh,
                &sub.auth,
                sub.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_push_subscriptions(&self, user_id: &str) -> StoreResult<Vec<PushSubscription>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM push_subscriptions WHERE user_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![user_id], |row| row_to_push_subscription(row))?;

        let mut subs = Vec::new();
        for row in rows {
            subs.push(row?);
        }
        Ok(subs)
    }

    pub fn delete_push_subscription(&self, user_id: &str, endpoint: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
            params![user_id, endpoint],
        )?;
        Ok(rows)
    }

    // ==================== Feed Operations ====================

    /// Vinyls owned by accounts the viewer follows (accepted only), newest
    /// first with id as tie-break so pagination is stable under concurrent
    /// inserts.
    pub fn recent_feed(
        &self,
        viewer_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<FeedItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT v.id, v.user_id, v.artist, v.title, v.year, v.format, v.cover_url,
                      v.created_at, u.username, u.display_name, u.avatar_url,
                      (SELECT COUNT(*) FROM likes l WHERE l.vinyl_id = v.id) AS like_count,
                      (SELECT COUNT(*) FROM comments c WHERE c.vinyl_id = v.id) AS comment_count,
                      EXISTS(SELECT 1 FROM likes l
                             WHERE l.vinyl_id = v.id AND l.user_id = ?1) AS has_liked
               FROM vinyls v
               JOIN users u ON u.id = v.user_id
               JOIN follows f ON f.following_id = v.user_id
                    AND f.follower_id = ?1 AND f.status = 'accepted'
               ORDER BY v.created_at DESC, v.id DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt.query_map(params![viewer_id, limit, offset], |row| row_to_feed_item(row))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn count_feed(&self, viewer_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM vinyls v
               JOIN follows f ON f.following_id = v.user_id
                    AND f.follower_id = ?1 AND f.status = 'accepted'"#,
            params![viewer_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ==================== Row Mappers ====================

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        display_name: row.get("display_name")?,
        bio: row.get("bio")?,
        avatar_url: row.get("avatar_url")?,
        is_public: row.get("is_public")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_user_summary(row: &rusqlite::Row) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get("id")?,
        username: row.get("username")?,
        display_name: row.get("display_name")?,
        avatar_url: row.get("avatar_url")?,
        is_public: row.get("is_public")?,
    })
}

fn row_to_vinyl(row: &rusqlite::Row) -> rusqlite::Result<Vinyl> {
    Ok(Vinyl {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        artist: row.get("artist")?,
        title: row.get("title")?,
        year: row.get("year")?,
        barcode: row.get("barcode")?,
        format: row.get("format")?,
        cover_url: row.get("cover_url")?,
        notes: row.get("notes")?,
        gifted_by: row.get("gifted_by")?,
        shared_with: row.get("shared_with")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_follow(row: &rusqlite::Row) -> rusqlite::Result<Follow> {
    let status_str: String = row.get("status")?;
    let status = FollowStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown follow status: {}", status_str).into(),
        )
    })?;

    Ok(Follow {
        id: row.get("id")?,
        follower_id: row.get("follower_id")?,
        following_id: row.get("following_id")?,
        status,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        vinyl_id: row.get("vinyl_id")?,
        user_id: row.get("user_id")?,
        parent_id: row.get("parent_id")?,
        content: row.get("content")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_comment_view(row: &rusqlite::Row) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        id: row.get("id")?,
        vinyl_id: row.get("vinyl_id")?,
        user_id: row.get("user_id")?,
        parent_id: row.get("parent_id")?,
        content: row.get("content")?,
        username: row.get("username")?,
        display_name: row.get("display_name")?,
        avatar_url: row.get("avatar_url")?,
        like_count: row.get("like_count")?,
        has_liked: row.get("has_liked")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_notification_view(row: &rusqlite::Row) -> rusqlite::Result<NotificationView> {
    let kind_str: String = row.get("type")?;
    let kind = NotificationKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown notification type: {}", kind_str).into(),
        )
    })?;

    Ok(NotificationView {
        id: row.get("id")?,
        sender_id: row.get("sender_id")?,
        kind,
        reference_id: row.get("reference_id")?,
        is_read: row.get("is_read")?,
        sender_username: row.get("username")?,
        sender_display_name: row.get("display_name")?,
        sender_avatar_url: row.get("avatar_url")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_push_subscription(row: &rusqlite::Row) -> rusqlite::Result<PushSubscription> {
    Ok(PushSubscription {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        endpoint: row.get("endpoint")?,
        p256dh: row.get("p256dh")?,
        auth: row.get("auth")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_feed_item(row: &rusqlite::Row) -> rusqlite::Result<FeedItem> {
    Ok(FeedItem {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        artist: row.get("artist")?,
        title: row.get("title")?,
        year: row.get("year")?,
        format: row.get("format")?,
        cover_url: row.get("cover_url")?,
        username: row.get("username")?,
        display_name: row.get("display_name")?,
        avatar_url: row.get("avatar_url")?,
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        has_liked: row.get("has_liked")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(store: &Store, username: &str) -> User {
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            display_name: username.to_string(),
            bio: String::new(),
            avatar_url: String::new(),
            is_public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&mut user).unwrap();
        user
    }

    fn make_vinyl(store: &Store, user_id: &str, title: &str) -> Vinyl {
        let mut vinyl = Vinyl {
            id: String::new(),
            user_id: user_id.to_string(),
            artist: "Can".to_string(),
            title: title.to_string(),
            year: Some(1971),
            barcode: None,
            format: "vinyl".to_string(),
            cover_url: String::new(),
            notes: String::new(),
            gifted_by: None,
            shared_with: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_vinyl(&mut vinyl).unwrap();
        vinyl
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "mara");
        assert!(!user.id.is_empty());

        let retrieved = store.get_user(&user.id).unwrap();
        assert_eq!(retrieved.username, "mara");
        assert!(retrieved.is_public);
    }

    #[test]
    fn test_duplicate_username_is_conflict() {
        let store = Store::in_memory().unwrap();
        make_user(&store, "mara");

        let mut dup = User {
            id: String::new(),
            username: "mara".to_string(),
            email: "other@example.com".to_string(),
            password_hash: "hash".to_string(),
            display_name: String::new(),
            bio: String::new(),
            avatar_url: String::new(),
            is_public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match store.create_user(&mut dup) {
            Err(StoreError::Conflict(_)) => {}
            other => panic!("expected conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_follow_lifecycle() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let b = make_user(&store, "bob");

        let mut follow = Follow {
            id: String::new(),
            follower_id: a.id.clone(),
            following_id: b.id.clone(),
            status: FollowStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_follow(&mut follow).unwrap();

        let edge = store.get_follow(&a.id, &b.id).unwrap();
        assert_eq!(edge.status, FollowStatus::Pending);
        assert!(!store.is_following_accepted(&a.id, &b.id).unwrap());

        assert_eq!(store.accept_follow(&a.id, &b.id).unwrap(), 1);
        assert!(store.is_following_accepted(&a.id, &b.id).unwrap());

        // Second accept is a no-op on an already-accepted edge
        assert_eq!(store.accept_follow(&a.id, &b.id).unwrap(), 0);

        assert_eq!(store.delete_follow(&a.id, &b.id).unwrap(), 1);
        assert!(matches!(
            store.get_follow(&a.id, &b.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_follow_is_conflict() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let b = make_user(&store, "bob");

        let mut first = Follow {
            id: String::new(),
            follower_id: a.id.clone(),
            following_id: b.id.clone(),
            status: FollowStatus::Accepted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_follow(&mut first).unwrap();

        let mut second = Follow {
            id: String::new(),
            follower_id: a.id.clone(),
            following_id: b.id.clone(),
            status: FollowStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            store.create_follow(&mut second),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_like_toggle_uniqueness() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let vinyl = make_vinyl(&store, &a.id, "Tago Mago");

        let mut like = Like {
            id: String::new(),
            user_id: a.id.clone(),
            vinyl_id: vinyl.id.clone(),
            created_at: Utc::now(),
        };
        store.create_like(&mut like).unwrap();
        assert!(store.has_liked(&a.id, &vinyl.id).unwrap());
        assert_eq!(store.count_likes(&vinyl.id).unwrap(), 1);

        // A racing double-insert hits the unique constraint
        let mut dup = Like {
            id: String::new(),
            user_id: a.id.clone(),
            vinyl_id: vinyl.id.clone(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.create_like(&mut dup),
            Err(StoreError::Conflict(_))
        ));

        assert_eq!(store.delete_like(&a.id, &vinyl.id).unwrap(), 1);
        assert!(!store.has_liked(&a.id, &vinyl.id).unwrap());
    }

    #[test]
    fn test_vinyl_delete_cascades_interactions() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let b = make_user(&store, "bob");
        let vinyl = make_vinyl(&store, &a.id, "Future Days");

        let mut like = Like {
            id: String::new(),
            user_id: b.id.clone(),
            vinyl_id: vinyl.id.clone(),
            created_at: Utc::now(),
        };
        store.create_like(&mut like).unwrap();

        let mut comment = Comment {
            id: String::new(),
            vinyl_id: vinyl.id.clone(),
            user_id: b.id.clone(),
            parent_id: None,
            content: "Great pressing".to_string(),
            created_at: Utc::now(),
        };
        store.create_comment(&mut comment).unwrap();

        let mut cl = CommentLike {
            id: String::new(),
            user_id: a.id.clone(),
            comment_id: comment.id.clone(),
            created_at: Utc::now(),
        };
        store.create_comment_like(&mut cl).unwrap();

        store.delete_vinyl(&vinyl.id).unwrap();

        assert_eq!(store.count_likes(&vinyl.id).unwrap(), 0);
        assert_eq!(store.count_comments(&vinyl.id).unwrap(), 0);
        assert_eq!(store.count_comment_likes(&comment.id).unwrap(), 0);
    }

    #[test]
    fn test_feed_only_shows_accepted_follows() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let b = make_user(&store, "bob");
        let c = make_user(&store, "carol");

        make_vinyl(&store, &b.id, "Ege Bamyasi");
        make_vinyl(&store, &c.id, "Soon Over Babaluma");

        let mut follow = Follow {
            id: String::new(),
            follower_id: a.id.clone(),
            following_id: b.id.clone(),
            status: FollowStatus::Accepted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_follow(&mut follow).unwrap();

        // Pending edge to carol must not leak into the feed
        let mut pending = Follow {
            id: String::new(),
            follower_id: a.id.clone(),
            following_id: c.id.clone(),
            status: FollowStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_follow(&mut pending).unwrap();

        let feed = store.recent_feed(&a.id, 10, 0).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Ege Bamyasi");
        assert_eq!(feed[0].username, "bob");
        assert!(!feed[0].has_liked);
        assert_eq!(store.count_feed(&a.id).unwrap(), 1);
    }

    #[test]
    fn test_notification_read_scoping() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");
        let b = make_user(&store, "bob");

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: a.id.clone(),
            sender_id: b.id.clone(),
            kind: NotificationKind::NewFollower,
            reference_id: Some(b.id.clone()),
            is_read: false,
            created_at: Utc::now(),
        };
        store.create_notification(&notification).unwrap();

        assert_eq!(store.count_unread_notifications(&a.id).unwrap(), 1);

        // Wrong recipient cannot mark it read
        assert_eq!(
            store.mark_notification_read(&notification.id, &b.id).unwrap(),
            0
        );
        assert_eq!(
            store.mark_notification_read(&notification.id, &a.id).unwrap(),
            1
        );
        assert_eq!(store.count_unread_notifications(&a.id).unwrap(), 0);
    }

    #[test]
    fn test_push_subscription_upsert() {
        let store = Store::in_memory().unwrap();
        let a = make_user(&store, "alice");

        let mut sub = PushSubscription {
            id: String::new(),
            user_id: a.id.clone(),
            endpoint: "https://push.example/ep1".to_string(),
            p256dh: "key1".to_string(),
            auth: "auth1".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_push_subscription(&mut sub).unwrap();

        // Re-subscribing the same endpoint refreshes keys, no second row
        let mut again = PushSubscription {
            id: String::new(),
            user_id: a.id.clone(),
            endpoint: "https://push.example/ep1".to_string(),
            p256dh: "key2".to_string(),
            auth: "auth2".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_push_subscription(&mut again).unwrap();

        let subs = store.list_push_subscriptions(&a.id).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].p256dh, "key2");

        assert_eq!(
            store
                .delete_push_subscription(&a.id, "https://push.example/ep1")
                .unwrap(),
            1
        );
        assert!(store.list_push_subscriptions(&a.id).unwrap().is_empty());
    }
}
