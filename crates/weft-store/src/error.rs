use weft_core::ids::ThreadId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Domain-level failure taxonomy for thread operations. Every variant
/// carries the operation context and the underlying store cause; nothing
/// is retried and nothing propagates raw.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to create thread: {source}")]
    CreationFailure {
        #[source]
        source: StoreError,
    },

    #[error("failed to attach comment to thread {thread_id}: {source}")]
    CommentAttachFailure {
        thread_id: ThreadId,
        #[source]
        source: StoreError,
    },

    #[error("failed to fetch {what}: {source}")]
    FetchFailure {
        what: String,
        #[source]
        source: StoreError,
    },
}

impl ThreadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::CreationFailure { .. } => "creation_failure",
            Self::CommentAttachFailure { .. } => "comment_attach_failure",
            Self::FetchFailure { .. } => "fetch_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        let err = ThreadError::NotFound("thread thr_x".into());
        assert!(err.is_not_found());
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn creation_failure_wraps_cause() {
        let err = ThreadError::CreationFailure {
            source: StoreError::Database("disk full".into()),
        };
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), "creation_failure");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn attach_failure_names_parent() {
        let id = ThreadId::from_raw("thr_parent");
        let err = ThreadError::CommentAttachFailure {
            thread_id: id,
            source: StoreError::Database("locked".into()),
        };
        assert!(err.to_string().contains("thr_parent"));
        assert_eq!(err.kind(), "comment_attach_failure");
    }

    #[test]
    fn rusqlite_error_maps_to_database() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
