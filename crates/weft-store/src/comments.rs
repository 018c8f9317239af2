use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::instrument;

use weft_core::ids::{ThreadId, UserId};
use weft_core::invalidate::PathInvalidator;

use crate::database::Database;
use crate::error::{StoreError, ThreadError};
use crate::threads::{row_to_thread, ThreadRow};

/// Per-parent append lock.
/// Serializes reply attachment so two concurrent replies to the same
/// parent both land in its children log with distinct positions.
struct ParentLocks {
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl ParentLocks {
    fn new() -> Self {
        Self {
            locks: HashMap::new(),
        }
    }

    fn get(&mut self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct CommentRepo {
    db: Database,
    invalidator: Arc<dyn PathInvalidator>,
    parent_locks: Mutex<ParentLocks>,
}

impl CommentRepo {
    pub fn new(db: Database, invalidator: Arc<dyn PathInvalidator>) -> Self {
        Self {
            db,
            invalidator,
            parent_locks: Mutex::new(ParentLocks::new()),
        }
    }

    /// Attach a reply to an existing thread. Atomically:
    /// 1. Acquires the parent's append lock
    /// 2. Verifies the parent exists
    /// 3. Inserts the reply with `parent_id` set and its position computed
    ///    in the INSERT itself (never a read-modify-write of the parent)
    ///
    /// The parent row is never rewritten, so a concurrent reply cannot
    /// drop this one from the children log.
    #[instrument(skip(self, body, path), fields(thread_id = %thread_id, author_id = %author_id))]
    pub fn add_comment(
        &self,
        thread_id: &ThreadId,
        body: &str,
        author_id: &UserId,
        path: &str,
    ) -> Result<ThreadRow, ThreadError> {
        let lock = self.parent_locks.lock().get(thread_id.as_str());
        let _guard = lock.lock();

        let id = ThreadId::new();
        let now = Utc::now().to_rfc3339();

        let result = self.db.with_conn(|conn| {
            // Only an empty result means the parent is absent; any other
            // read failure keeps its store cause.
            match conn.query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                [thread_id.as_str()],
                |_| Ok(()),
            ) {
                Ok(()) => {}
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(StoreError::NotFound(format!("thread {thread_id}")));
                }
                Err(e) => return Err(e.into()),
            }

            conn.execute(
                "INSERT INTO threads (id, body, author_id, parent_id, community_id, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL,
                         (SELECT COUNT(*) FROM threads WHERE parent_id = ?4), ?5)",
                rusqlite::params![
                    id.as_str(),
                    body,
                    author_id.as_str(),
                    thread_id.as_str(),
                    now,
                ],
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, body, author_id, parent_id, community_id, position, created_at
                 FROM threads WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_thread(row),
                None => Err(StoreError::Database(format!("reply {id} vanished after insert"))),
            }
        });

        match result {
            Ok(row) => {
                self.invalidator.invalidate(path);
                Ok(row)
            }
            Err(StoreError::NotFound(what)) => Err(ThreadError::NotFound(what)),
            Err(source) => Err(ThreadError::CommentAttachFailure {
                thread_id: thread_id.clone(),
                source,
            }),
        }
    }

    /// Direct children ids of a thread, in append order.
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub fn children_of(&self, thread_id: &ThreadId) -> Result<Vec<ThreadId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM threads WHERE parent_id = ?1 ORDER BY position ASC",
            )?;
            let ids = stmt
                .query_map([thread_id.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(ThreadId::from_raw)
                .collect();
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadRepo;
    use crate::users::UserRepo;
    use weft_core::invalidate::{BroadcastInvalidator, NoopInvalidator};

    fn setup() -> (Database, ThreadRow, UserId) {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let author = users.upsert("auth-1", "Ada", "ada", "img/ada", true).unwrap();
        let threads = ThreadRepo::new(db.clone(), Arc::new(NoopInvalidator));
        let root = threads.create_thread("hello", &author.id, None, "/").unwrap();
        (db, root, author.id)
    }

    #[test]
    fn reply_links_both_directions() {
        // P4: parent's children contain the reply exactly once, and the
        // reply's parent_id points back.
        let (db, root, author) = setup();
        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));

        let reply = repo.add_comment(&root.id, "nice post", &author, "/").unwrap();
        assert_eq!(reply.parent_id.as_ref().unwrap(), &root.id);

        let children = repo.children_of(&root.id).unwrap();
        assert_eq!(children, vec![reply.id]);
    }

    #[test]
    fn replies_gain_sequential_positions() {
        let (db, root, author) = setup();
        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));

        let r1 = repo.add_comment(&root.id, "first", &author, "/").unwrap();
        let r2 = repo.add_comment(&root.id, "second", &author, "/").unwrap();
        let r3 = repo.add_comment(&root.id, "third", &author, "/").unwrap();

        assert_eq!(r1.position, 0);
        assert_eq!(r2.position, 1);
        assert_eq!(r3.position, 2);
    }

    #[test]
    fn reply_to_reply_nests() {
        let (db, root, author) = setup();
        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));

        let reply = repo.add_comment(&root.id, "reply", &author, "/").unwrap();
        let nested = repo.add_comment(&reply.id, "nested", &author, "/").unwrap();

        assert_eq!(nested.parent_id.as_ref().unwrap(), &reply.id);
        assert_eq!(repo.children_of(&reply.id).unwrap(), vec![nested.id]);
    }

    #[test]
    fn missing_parent_is_not_found() {
        let (db, _, author) = setup();
        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));
        let result = repo.add_comment(&ThreadId::from_raw("thr_missing"), "hi", &author, "/");
        assert!(matches!(result, Err(ThreadError::NotFound(_))));
    }

    #[test]
    fn missing_author_is_attach_failure() {
        let (db, root, _) = setup();
        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));
        let ghost = UserId::from_raw("user_ghost");
        let result = repo.add_comment(&root.id, "hi", &ghost, "/");
        assert!(matches!(
            result,
            Err(ThreadError::CommentAttachFailure { .. })
        ));
    }

    #[test]
    fn success_fires_invalidation() {
        let (db, root, author) = setup();
        let (tx, mut rx) = tokio::sync::broadcast::channel(16);
        let repo = CommentRepo::new(db, Arc::new(BroadcastInvalidator::new(tx)));

        repo.add_comment(&root.id, "hi", &author, "/thread/abc").unwrap();
        assert_eq!(rx.try_recv().unwrap().path, "/thread/abc");
    }

    #[test]
    fn failure_does_not_fire_invalidation() {
        let (db, _, author) = setup();
        let (tx, mut rx) = tokio::sync::broadcast::channel(16);
        let repo = CommentRepo::new(db, Arc::new(BroadcastInvalidator::new(tx)));

        let _ = repo.add_comment(&ThreadId::from_raw("thr_missing"), "hi", &author, "/");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn read_failure_is_attach_failure_not_absence() {
        // A store-level failure during the parent check must surface as
        // an attach failure with its cause, not as the parent being
        // absent.
        let (db, root, author) = setup();
        db.with_conn(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE threads;")
                .map_err(StoreError::from)
        })
        .unwrap();

        let repo = CommentRepo::new(db, Arc::new(NoopInvalidator));
        let result = repo.add_comment(&root.id, "hi", &author, "/");
        assert!(
            matches!(result, Err(ThreadError::CommentAttachFailure { .. })),
            "got: {result:?}"
        );
    }

    #[test]
    fn concurrent_replies_both_attached() {
        // P7 regression: the lost-update race of a read-modify-write parent
        // append would drop one of two concurrent replies. The atomic
        // append must keep both.
        let (db, root, author) = setup();
        let repo = Arc::new(CommentRepo::new(db, Arc::new(NoopInvalidator)));

        let mut handles = vec![];
        for i in 0..10 {
            let repo = repo.clone();
            let parent = root.id.clone();
            let author = author.clone();
            handles.push(std::thread::spawn(move || {
                repo.add_comment(&parent, &format!("reply {i}"), &author, "/")
                    .unwrap()
            }));
        }

        let replies: Vec<ThreadRow> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every reply got a distinct position
        let mut positions: Vec<i64> = replies.iter().map(|r| r.position).collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), 10);

        // And every reply is present in the parent's children log
        let children = repo.children_of(&root.id).unwrap();
        assert_eq!(children.len(), 10);
        for reply in &replies {
            assert_eq!(
                children.iter().filter(|c| **c == reply.id).count(),
                1,
                "reply {} missing or duplicated",
                reply.id
            );
        }
    }
}
