use crate::models::{GenerationRow, NewGeneration, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Users --

    /// Returns `false` when the email is already registered.
    pub fn create_user(&self, id: &str, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)",
                (id, email, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Generations --

    pub fn insert_generation(&self, generation: &NewGeneration<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO generations
                    (id, user_id, prompt, style, image_url, original_image_url, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'completed', ?7)",
                rusqlite::params![
                    generation.id,
                    generation.user_id,
                    generation.prompt,
                    generation.style,
                    generation.image_url,
                    generation.original_image_url,
                    generation.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// The `limit` most recent generations owned by `user_id`, newest first.
    pub fn recent_generations(&self, user_id: &str, limit: u32) -> Result<Vec<GenerationRow>> {
        self.with_conn(|conn| query_recent_generations(conn, user_id, limit))
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password_hash, created_at FROM users WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_recent_generations(
    conn: &Connection,
    user_id: &str,
    limit: u32,
) -> Result<Vec<GenerationRow>> {
    // rowid breaks ties between rows created within the same millisecond
    let mut stmt = conn.prepare(
        "SELECT id, user_id, prompt, style, image_url, original_image_url, status, created_at
         FROM generations
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], |row| {
            Ok(GenerationRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                prompt: row.get(2)?,
                style: row.get(3)?,
                image_url: row.get(4)?,
                original_image_url: row.get(5)?,
                status: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
