use crate::Database;
use crate::models::{PostRow, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// SQLite's `datetime('now')` produces this shape; OTP expiry timestamps are
/// written in the same format so plain string comparison orders correctly.
pub const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(SQLITE_DATETIME_FORMAT).to_string()
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        otp: &str,
        otp_expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, is_verified, otp, otp_expires_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                rusqlite::params![id, name, email, password_hash, otp, otp_expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Store a fresh OTP and expiry on an existing user (resend path).
    pub fn set_otp(&self, id: &str, otp: &str, otp_expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET otp = ?1, otp_expires_at = ?2 WHERE id = ?3",
                rusqlite::params![otp, otp_expires_at, id],
            )?;
            Ok(())
        })
    }

    /// Guarded verification: flips `is_verified` and clears the OTP fields in
    /// one statement, only when the code matches and has not expired.
    /// Returns false (state untouched) otherwise.
    pub fn confirm_otp(&self, id: &str, otp: &str) -> Result<bool> {
        let now = format_datetime(&Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_verified = 1, otp = NULL, otp_expires_at = NULL
                 WHERE id = ?1 AND otp = ?2 AND otp_expires_at > ?3",
                rusqlite::params![id, otp, now],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        id: &str,
        title: &str,
        description: &str,
        content: &str,
        image_url: Option<&str>,
        author_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, title, description, content, image_url, author_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, title, description, content, image_url, author_id],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.author_id = u.id
                 WHERE p.id = ?1"
            ))?;
            let row = stmt.query_row([id], map_post_row).optional()?;
            Ok(row)
        })
    }

    pub fn count_posts(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    pub fn count_posts_by_author(&self, author_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
                [author_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            // rowid breaks ties: datetime('now') has 1-second resolution, so
            // posts created in the same second still come back newest-first.
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.author_id = u.id
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], map_post_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_posts_by_author(
        &self,
        author_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.author_id = u.id
                 WHERE p.author_id = ?1
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![author_id, limit, offset], map_post_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_post(
        &self,
        id: &str,
        title: &str,
        description: &str,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE posts
                 SET title = ?1, description = ?2, content = ?3, image_url = ?4,
                     updated_at = datetime('now')
                 WHERE id = ?5",
                rusqlite::params![title, description, content, image_url, id],
            )?;
            Ok(())
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_verified, otp, otp_expires_at, created_at";

const POST_COLUMNS: &str = "p.id, p.title, p.description, p.content, p.image_url, p.author_id, \
                            u.name, p.created_at, p.updated_at";

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"
    ))?;
    let row = stmt.query_row([value], map_user_row).optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_verified: row.get(4)?,
        otp: row.get(5)?,
        otp_expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_post_row(row: &rusqlite::Row<'_>) -> std::result::Result<PostRow, rusqlite::Error> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        image_url: row.get(4)?,
        author_id: row.get(5)?,
        author_name: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, id: &str, email: &str) {
        let expiry = format_datetime(&(Utc::now() + Duration::minutes(10)));
        db.create_user(id, "Ada", email, "hash", "123456", &expiry)
            .unwrap();
    }

    #[test]
    fn email_is_unique() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        let expiry = format_datetime(&(Utc::now() + Duration::minutes(10)));
        let err = db.create_user("u2", "Ada", "ada@example.com", "hash", "654321", &expiry);
        assert!(err.is_err());
    }

    #[test]
    fn lookup_by_email_and_id() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        let by_email = db.get_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, "u1");
        assert!(!by_email.is_verified);
        assert_eq!(by_email.otp.as_deref(), Some("123456"));
        assert!(db.get_user_by_id("u1").unwrap().is_some());
        assert!(db.get_user_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn confirm_otp_flips_and_clears() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        assert!(db.confirm_otp("u1", "123456").unwrap());
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.otp.is_none());
        assert!(user.otp_expires_at.is_none());
    }

    #[test]
    fn confirm_otp_rejects_wrong_code() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        assert!(!db.confirm_otp("u1", "000000").unwrap());
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert!(!user.is_verified);
        assert_eq!(user.otp.as_deref(), Some("123456"));
    }

    #[test]
    fn confirm_otp_rejects_expired_code() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        let past = format_datetime(&(Utc::now() - Duration::minutes(1)));
        db.set_otp("u1", "123456", &past).unwrap();
        assert!(!db.confirm_otp("u1", "123456").unwrap());
        assert!(!db.get_user_by_id("u1").unwrap().unwrap().is_verified);
    }

    #[test]
    fn post_pagination_windows() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        for i in 0..13 {
            db.insert_post(&format!("p{i}"), &format!("title {i}"), "d", "c", None, "u1")
                .unwrap();
        }
        assert_eq!(db.count_posts().unwrap(), 13);

        let first = db.list_posts(6, 0).unwrap();
        assert_eq!(first.len(), 6);
        // Newest first: the last insert leads the first page.
        assert_eq!(first[0].id, "p12");

        let last = db.list_posts(6, 12).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, "p0");
    }

    #[test]
    fn author_listing_filters() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        seed_user(&db, "u2", "grace@example.com");
        db.insert_post("p1", "mine", "d", "c", None, "u1").unwrap();
        db.insert_post("p2", "theirs", "d", "c", None, "u2").unwrap();

        let mine = db.list_posts_by_author("u1", 6, 0).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "p1");
        assert_eq!(db.count_posts_by_author("u1").unwrap(), 1);
    }

    #[test]
    fn update_and_delete_post() {
        let db = db();
        seed_user(&db, "u1", "ada@example.com");
        db.insert_post("p1", "before", "d", "c", None, "u1").unwrap();

        db.update_post("p1", "after", "d2", "c2", Some("/uploads/x.png"))
            .unwrap();
        let post = db.get_post("p1").unwrap().unwrap();
        assert_eq!(post.title, "after");
        assert_eq!(post.image_url.as_deref(), Some("/uploads/x.png"));
        assert_eq!(post.author_name, "Ada");

        assert!(db.delete_post("p1").unwrap());
        assert!(!db.delete_post("p1").unwrap());
        assert!(db.get_post("p1").unwrap().is_none());
    }
}
