/// Database row types — these map directly to SQLite rows.
/// Distinct from quill-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub otp: Option<String>,
    pub otp_expires_at: Option<String>,
    pub created_at: String,
}

pub struct PostRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub created_at: String,
    pub updated_at: String,
}
