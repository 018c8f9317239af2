use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Escape LIKE special characters for safe pattern matching.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn escape_like_special_chars() {
        assert_eq!(escape_like("hello"), "hello");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("foo_bar"), "foo\\_bar");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn get_reports_table_and_column() {
        let db = Database::in_memory().unwrap();
        let result = db.with_conn(|conn| {
            conn.query_row("SELECT 'not a number'", [], |row| {
                // Force a type mismatch via the helper
                Ok(get::<i64>(row, 0, "threads", "position"))
            })
            .map_err(StoreError::from)?
        });
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "threads", column: "position", .. })
        ));
    }

    #[test]
    fn get_opt_passes_null_through() {
        let db = Database::in_memory().unwrap();
        let result: Option<String> = db
            .with_conn(|conn| {
                conn.query_row("SELECT NULL", [], |row| {
                    Ok(get_opt::<String>(row, 0, "threads", "parent_id"))
                })
                .map_err(StoreError::from)?
            })
            .unwrap();
        assert!(result.is_none());
    }
}
