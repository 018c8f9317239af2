use serde::{Deserialize, Serialize};
use tracing::instrument;

use weft_core::ids::{ThreadId, UserId};

use crate::database::Database;
use crate::error::ThreadError;
use crate::row_helpers;
use crate::threads::AuthorRef;

/// A reply received on one of a user's threads, author resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ThreadId,
    /// The user's own thread this reply was attached to.
    pub parent_id: ThreadId,
    pub body: String,
    pub author: AuthorRef,
    pub created_at: String,
}

pub struct ActivityRepo {
    db: Database,
}

impl ActivityRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All replies made to threads authored by `user_id`, flattened.
    /// Ordered by the user's threads in creation order, then by append
    /// order within each thread; no global re-sort by timestamp.
    /// A user with no threads or no replied-to threads gets an empty vec.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn get_activity(&self, user_id: &UserId) -> Result<Vec<ActivityEntry>, ThreadError> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.id, c.parent_id, c.body, c.created_at,
                            u.id, u.name, u.image
                     FROM threads c
                     JOIN threads p ON p.id = c.parent_id
                     JOIN users u ON u.id = c.author_id
                     WHERE p.author_id = ?1
                     ORDER BY p.created_at ASC, p.id ASC, c.position ASC",
                )?;
                let mut rows = stmt.query([user_id.as_str()])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push(ActivityEntry {
                        id: ThreadId::from_raw(row_helpers::get::<String>(row, 0, "threads", "id")?),
                        parent_id: ThreadId::from_raw(row_helpers::get::<String>(
                            row, 1, "threads", "parent_id",
                        )?),
                        body: row_helpers::get(row, 2, "threads", "body")?,
                        created_at: row_helpers::get(row, 3, "threads", "created_at")?,
                        author: AuthorRef {
                            id: UserId::from_raw(row_helpers::get::<String>(row, 4, "users", "id")?),
                            name: row_helpers::get(row, 5, "users", "name")?,
                            image: row_helpers::get(row, 6, "users", "image")?,
                        },
                    });
                }
                Ok(entries)
            })
            .map_err(|source| ThreadError::FetchFailure {
                what: format!("activity for user {user_id}"),
                source,
            })
    }
}
