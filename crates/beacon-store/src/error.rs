use beacon_core::FolderKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Blank or malformed input. Never retried; the caller must correct it.
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Folder kind does not match the kind the rule status requires.
    #[error("type mismatch: expected {expected} folder, got {actual}")]
    TypeMismatch {
        expected: FolderKind,
        actual: FolderKind,
    },

    /// Business-rule rejection: duplicate name, cycle, folder has children.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Attempt to mutate or delete a reserved root folder.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Wrapped storage failure. Not retried by this crate.
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::Database(_) => "database",
            Self::CorruptRow { .. } => "corrupt_row",
            Self::Io(_) => "io",
        }
    }

}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings() {
        assert_eq!(StoreError::Validation("x".into()).kind(), "validation");
        assert_eq!(
            StoreError::TypeMismatch {
                expected: FolderKind::Bookmark,
                actual: FolderKind::Block,
            }
            .kind(),
            "type_mismatch"
        );
        assert_eq!(StoreError::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(StoreError::Database("locked".into()).kind(), "database");
        assert_eq!(
            StoreError::CorruptRow {
                table: "folders",
                column: "kind",
                detail: "bad".into(),
            }
            .kind(),
            "corrupt_row"
        );
    }
}
