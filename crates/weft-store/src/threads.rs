use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use weft_core::ids::{CommunityId, ThreadId, UserId};
use weft_core::invalidate::PathInvalidator;

use crate::database::Database;
use crate::error::{StoreError, ThreadError};
use crate::row_helpers;

/// How many levels of replies `fetch_thread_by_id` expands below the root.
/// The single-thread view shows the root, its replies, and their replies;
/// anything deeper is reachable by viewing the reply itself. This cap is
/// policy, not an accident: it bounds the response size for deeply nested
/// discussions.
pub const REPLY_TREE_DEPTH: u32 = 2;

/// Author reference resolved for presentation (restricted field set).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: UserId,
    pub name: String,
    pub image: String,
}

/// A stored thread row, references unresolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadRow {
    pub id: ThreadId,
    pub body: String,
    pub author_id: UserId,
    pub parent_id: Option<ThreadId>,
    pub community_id: Option<CommunityId>,
    pub position: i64,
    pub created_at: String,
}

impl ThreadRow {
    /// A top-level thread is precisely one with no parent; this predicate
    /// is the sole criterion for feed membership.
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A thread with its author resolved and children expanded to some depth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadNode {
    pub id: ThreadId,
    pub body: String,
    pub author: AuthorRef,
    pub parent_id: Option<ThreadId>,
    pub community_id: Option<CommunityId>,
    pub created_at: String,
    pub children: Vec<ThreadNode>,
}

/// One page of the top-level feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadPage {
    pub posts: Vec<ThreadNode>,
    pub has_next: bool,
}

pub struct ThreadRepo {
    db: Database,
    invalidator: Arc<dyn PathInvalidator>,
}

impl ThreadRepo {
    pub fn new(db: Database, invalidator: Arc<dyn PathInvalidator>) -> Self {
        Self { db, invalidator }
    }

    /// Create a top-level post and append it to the author's thread list.
    /// The caller's input layer has already validated `body` is non-empty;
    /// it is not re-checked here.
    #[instrument(skip(self, body, path), fields(author_id = %author_id))]
    pub fn create_thread(
        &self,
        body: &str,
        author_id: &UserId,
        community_id: Option<&CommunityId>,
        path: &str,
    ) -> Result<ThreadRow, ThreadError> {
        // TODO: community_id is accepted but never persisted; threads
        // always store NULL until community support lands. Matches the
        // current application behavior.
        let _ = community_id;

        let id = ThreadId::new();
        let now = Utc::now().to_rfc3339();

        let row = self
            .db
            .with_conn(|conn| {
                match conn.query_row(
                    "SELECT 1 FROM users WHERE id = ?1",
                    [author_id.as_str()],
                    |_| Ok(()),
                ) {
                    Ok(()) => {}
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::NotFound(format!("user {author_id}")));
                    }
                    Err(e) => return Err(e.into()),
                }

                conn.execute(
                    "INSERT INTO threads (id, body, author_id, parent_id, community_id, position, created_at)
                     VALUES (?1, ?2, ?3, NULL, NULL, 0, ?4)",
                    rusqlite::params![id.as_str(), body, author_id.as_str(), now],
                )?;

                conn.execute(
                    "INSERT INTO user_threads (user_id, thread_id, position)
                     VALUES (?1, ?2, (SELECT COUNT(*) FROM user_threads WHERE user_id = ?1))",
                    rusqlite::params![author_id.as_str(), id.as_str()],
                )?;

                Ok(ThreadRow {
                    id: id.clone(),
                    body: body.to_string(),
                    author_id: author_id.clone(),
                    parent_id: None,
                    community_id: None,
                    position: 0,
                    created_at: now.clone(),
                })
            })
            .map_err(|source| ThreadError::CreationFailure { source })?;

        self.invalidator.invalidate(path);
        Ok(row)
    }

    /// Fetch one page of top-level threads, most recent first.
    /// Each post carries its resolved author and its direct replies one
    /// level deep (with their authors resolved); deeper nesting is not
    /// expanded here so the per-page cost stays bounded.
    #[instrument(skip(self), fields(page_number, page_size))]
    pub fn fetch_posts(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<ThreadPage, ThreadError> {
        // Page bounds are the caller's contract (>= 1); clamp rather than
        // error so the skip arithmetic stays total.
        let page_number = page_number.max(1);
        let page_size = page_size.max(1);
        let skip = (page_number as i64 - 1) * page_size as i64;

        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT t.id, t.body, t.author_id, t.parent_id, t.community_id, t.created_at,
                            u.name, u.image
                     FROM threads t JOIN users u ON u.id = t.author_id
                     WHERE t.parent_id IS NULL
                     ORDER BY t.created_at DESC, t.id DESC
                     LIMIT ?1 OFFSET ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![page_size as i64, skip])?;

                let mut posts = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut node = row_to_node(row)?;
                    node.children = load_children(conn, &node.id)?;
                    posts.push(node);
                }

                // Separate count over the same filter; counting must not
                // drag unrelated rows in.
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM threads WHERE parent_id IS NULL",
                    [],
                    |row| row.get(0),
                )?;

                let has_next = total > skip + posts.len() as i64;
                Ok(ThreadPage { posts, has_next })
            })
            .map_err(|source| ThreadError::FetchFailure {
                what: format!("posts page {page_number}"),
                source,
            })
    }

    /// Fetch a single thread with its reply tree expanded to
    /// `REPLY_TREE_DEPTH` levels below the root. A deeper tree comes back
    /// truncated at that depth.
    #[instrument(skip(self), fields(thread_id = %id))]
    pub fn fetch_thread_by_id(&self, id: &ThreadId) -> Result<ThreadNode, ThreadError> {
        let result = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.body, t.author_id, t.parent_id, t.community_id, t.created_at,
                        u.name, u.image
                 FROM threads t JOIN users u ON u.id = t.author_id
                 WHERE t.id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut root = match rows.next()? {
                Some(row) => row_to_node(row)?,
                None => return Err(StoreError::NotFound(format!("thread {id}"))),
            };
            root.children = load_subtree(conn, &root.id, REPLY_TREE_DEPTH)?;
            Ok(root)
        });

        match result {
            Ok(node) => Ok(node),
            Err(StoreError::NotFound(what)) => Err(ThreadError::NotFound(what)),
            Err(source) => Err(ThreadError::FetchFailure {
                what: format!("thread {id}"),
                source,
            }),
        }
    }
}

const NODE_CHILD_SQL: &str =
    "SELECT t.id, t.body, t.author_id, t.parent_id, t.community_id, t.created_at,
            u.name, u.image
     FROM threads t JOIN users u ON u.id = t.author_id
     WHERE t.parent_id = ?1
     ORDER BY t.position ASC";

/// Direct children of a thread, authors resolved, no grandchildren.
pub(crate) fn load_children(
    conn: &rusqlite::Connection,
    parent: &ThreadId,
) -> Result<Vec<ThreadNode>, StoreError> {
    load_subtree(conn, parent, 1)
}

/// Depth-capped recursive resolver: `depth` levels below `parent`.
fn load_subtree(
    conn: &rusqlite::Connection,
    parent: &ThreadId,
    depth: u32,
) -> Result<Vec<ThreadNode>, StoreError> {
    if depth == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(NODE_CHILD_SQL)?;
    let mut rows = stmt.query([parent.as_str()])?;
    let mut children = Vec::new();
    while let Some(row) = rows.next()? {
        children.push(row_to_node(row)?);
    }
    drop(rows);
    drop(stmt);

    for child in &mut children {
        child.children = load_subtree(conn, &child.id, depth - 1)?;
    }
    Ok(children)
}

fn row_to_node(row: &rusqlite::Row<'_>) -> Result<ThreadNode, StoreError> {
    Ok(ThreadNode {
        id: ThreadId::from_raw(row_helpers::get::<String>(row, 0, "threads", "id")?),
        body: row_helpers::get(row, 1, "threads", "body")?,
        author: AuthorRef {
            id: UserId::from_raw(row_helpers::get::<String>(row, 2, "threads", "author_id")?),
            name: row_helpers::get(row, 6, "users", "name")?,
            image: row_helpers::get(row, 7, "users", "image")?,
        },
        parent_id: row_helpers::get_opt::<String>(row, 3, "threads", "parent_id")?
            .map(ThreadId::from_raw),
        community_id: row_helpers::get_opt::<String>(row, 4, "threads", "community_id")?
            .map(CommunityId::from_raw),
        created_at: row_helpers::get(row, 5, "threads", "created_at")?,
        children: Vec::new(),
    })
}

pub(crate) fn row_to_thread(row: &rusqlite::Row<'_>) -> Result<ThreadRow, StoreError> {
    Ok(ThreadRow {
        id: ThreadId::from_raw(row_helpers::get::<String>(row, 0, "threads", "id")?),
        body: row_helpers::get(row, 1, "threads", "body")?,
        author_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "threads", "author_id")?),
        parent_id: row_helpers::get_opt::<String>(row, 3, "threads", "parent_id")?
            .map(ThreadId::from_raw),
        community_id: row_helpers::get_opt::<String>(row, 4, "threads", "community_id")?
            .map(CommunityId::from_raw),
        position: row_helpers::get(row, 5, "threads", "position")?,
        created_at: row_helpers::get(row, 6, "threads", "created_at")?,
    })
}
