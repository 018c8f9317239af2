use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use weft_core::ids::{ThreadId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Identity record. Created during onboarding; the external identity
/// provider owns authentication, we only keep the opaque auth id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub auth_id: String,
    pub name: String,
    pub username: String,
    pub image: String,
    pub onboarded: bool,
    pub created_at: String,
}

/// One page of a user search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPage {
    pub users: Vec<UserRow>,
    pub has_next: bool,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or update the user for the given external auth id.
    /// Onboarding calls this once with the profile fields; repeat calls
    /// update the profile in place and keep the internal id stable.
    #[instrument(skip(self), fields(auth_id))]
    pub fn upsert(
        &self,
        auth_id: &str,
        name: &str,
        username: &str,
        image: &str,
        onboarded: bool,
    ) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let existing: Option<(String, String)> = conn
                .query_row(
                    "SELECT id, created_at FROM users WHERE auth_id = ?1",
                    [auth_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .ok();

            if let Some((id, created_at)) = existing {
                conn.execute(
                    "UPDATE users SET name = ?1, username = ?2, image = ?3, onboarded = ?4
                     WHERE auth_id = ?5",
                    rusqlite::params![name, username, image, onboarded, auth_id],
                )?;
                return Ok(UserRow {
                    id: UserId::from_raw(id),
                    auth_id: auth_id.to_string(),
                    name: name.to_string(),
                    username: username.to_string(),
                    image: image.to_string(),
                    onboarded,
                    created_at,
                });
            }

            let id = UserId::new();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO users (id, auth_id, name, username, image, onboarded, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id.as_str(), auth_id, name, username, image, onboarded, now],
            )?;

            Ok(UserRow {
                id,
                auth_id: auth_id.to_string(),
                name: name.to_string(),
                username: username.to_string(),
                image: image.to_string(),
                onboarded,
                created_at: now,
            })
        })
    }

    /// Get a user by internal id.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, auth_id, name, username, image, onboarded, created_at
                 FROM users WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user {id}"))),
            }
        })
    }

    /// Get a user by the external auth identifier (fetchUser-style lookup).
    #[instrument(skip(self), fields(auth_id))]
    pub fn get_by_auth_id(&self, auth_id: &str) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, auth_id, name, username, image, onboarded, created_at
                 FROM users WHERE auth_id = ?1",
            )?;
            let mut rows = stmt.query([auth_id])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user auth {auth_id}"))),
            }
        })
    }

    /// Paginated user search for the search surface. Matches name or
    /// username case-insensitively, always excluding the requesting user;
    /// newest accounts first. An empty search string lists everyone else.
    #[instrument(skip(self), fields(user_id = %requesting_user, search_string))]
    pub fn fetch_users(
        &self,
        requesting_user: &UserId,
        search_string: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<UserPage, StoreError> {
        let page_number = page_number.max(1);
        let page_size = page_size.max(1);
        let skip = (page_number as i64 - 1) * page_size as i64;
        let needle = search_string.trim();

        self.db.with_conn(|conn| {
            let (users, total) = if needle.is_empty() {
                let mut stmt = conn.prepare(
                    "SELECT id, auth_id, name, username, image, onboarded, created_at
                     FROM users WHERE id != ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let mut rows = stmt.query(rusqlite::params![
                    requesting_user.as_str(),
                    page_size as i64,
                    skip,
                ])?;
                let mut users = Vec::new();
                while let Some(row) = rows.next()? {
                    users.push(row_to_user(row)?);
                }
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE id != ?1",
                    [requesting_user.as_str()],
                    |row| row.get(0),
                )?;
                (users, total)
            } else {
                let pattern = format!("%{}%", row_helpers::escape_like(needle));
                let mut stmt = conn.prepare(
                    "SELECT id, auth_id, name, username, image, onboarded, created_at
                     FROM users
                     WHERE id != ?1
                       AND (name LIKE ?2 ESCAPE '\\' OR username LIKE ?2 ESCAPE '\\')
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?3 OFFSET ?4",
                )?;
                let mut rows = stmt.query(rusqlite::params![
                    requesting_user.as_str(),
                    pattern,
                    page_size as i64,
                    skip,
                ])?;
                let mut users = Vec::new();
                while let Some(row) = rows.next()? {
                    users.push(row_to_user(row)?);
                }
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users
                     WHERE id != ?1
                       AND (name LIKE ?2 ESCAPE '\\' OR username LIKE ?2 ESCAPE '\\')",
                    rusqlite::params![requesting_user.as_str(), pattern],
                    |row| row.get(0),
                )?;
                (users, total)
            };

            let has_next = total > skip + users.len() as i64;
            Ok(UserPage { users, has_next })
        })
    }

    /// The user's owned-thread list, in creation (append) order.
    /// Contains only top-level posts; replies are never appended here.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn thread_ids(&self, id: &UserId) -> Result<Vec<ThreadId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT thread_id FROM user_threads WHERE user_id = ?1 ORDER BY position ASC",
            )?;
            let ids = stmt
                .query_map([id.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(ThreadId::from_raw)
                .collect();
            Ok(ids)
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        auth_id: row_helpers::get(row, 1, "users", "auth_id")?,
        name: row_helpers::get(row, 2, "users", "name")?,
        username: row_helpers::get(row, 3, "users", "username")?,
        image: row_helpers::get(row, 4, "users", "image")?,
        onboarded: row_helpers::get(row, 5, "users", "onboarded")?,
        created_at: row_helpers::get(row, 6, "users", "created_at")?,
    })
}
