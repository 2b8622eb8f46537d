/// Database row types. These map directly to SQLite rows.
/// Distinct from studio-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

pub struct GenerationRow {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub style: String,
    pub image_url: String,
    pub original_image_url: String,
    pub status: String,
    pub created_at: String,
}

/// Values for a generation insert. `created_at` is supplied by the caller so
/// the stored row and the API response carry the same timestamp.
pub struct NewGeneration<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub prompt: &'a str,
    pub style: &'a str,
    pub image_url: &'a str,
    pub original_image_url: &'a str,
    pub created_at: &'a str,
}
