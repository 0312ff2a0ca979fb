use std::sync::Arc;

use rusqlite::Connection;
use tracing::instrument;

use beacon_core::{Clock, Folder, FolderId, FolderKind, SystemClock};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::rules;

const FOLDER_COLUMNS: &str = "id, parent_id, name, kind, created_at, updated_at";

/// Folder hierarchy manager. Owns tree and uniqueness invariants:
/// (parent, lowercase name, kind) is unique, child kind equals parent kind,
/// no folder may become its own ancestor, reserved roots are immutable.
pub struct FolderRepo {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl FolderRepo {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Idempotently insert the two reserved root folders. No-op when present.
    #[instrument(skip(self))]
    pub fn ensure_default_roots(&self) -> Result<(), StoreError> {
        let now = self.clock.now_str();
        self.db.with_tx(|tx| {
            for kind in [FolderKind::Bookmark, FolderKind::Block] {
                tx.execute(
                    "INSERT OR IGNORE INTO folders (id, parent_id, name, kind, created_at, updated_at)
                     VALUES (?1, NULL, ?2, ?3, ?4, ?4)",
                    rusqlite::params![
                        kind.root_id().as_i64(),
                        kind.root_name(),
                        kind.to_string(),
                        now,
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Create a folder. Returns the existing id when the collision is a
    /// reserved root (idempotent recreation); any other collision is a
    /// conflict.
    #[instrument(skip(self), fields(kind = %kind))]
    pub fn create(
        &self,
        name: &str,
        parent_id: Option<FolderId>,
        kind: FolderKind,
    ) -> Result<FolderId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("folder name must not be blank".into()));
        }
        if parent_id.is_none() {
            for other in [FolderKind::Bookmark, FolderKind::Block] {
                if other != kind && name.eq_ignore_ascii_case(other.root_name()) {
                    return Err(StoreError::Validation(format!(
                        "name '{name}' is reserved for the {other} root"
                    )));
                }
            }
        }

        let now = self.clock.now_str();
        self.db.with_tx(|tx| {
            if let Some(pid) = parent_id {
                let parent = fetch(tx, pid)?
                    .ok_or_else(|| StoreError::NotFound(format!("folder {pid}")))?;
                if parent.kind != kind {
                    return Err(StoreError::TypeMismatch {
                        expected: kind,
                        actual: parent.kind,
                    });
                }
            }

            if let Some(existing) = find_by_name(tx, name, parent_id, kind)? {
                if existing.is_reserved_root() {
                    return Ok(existing.id);
                }
                return Err(StoreError::Conflict(format!(
                    "folder '{name}' already exists at this level"
                )));
            }

            tx.execute(
                "INSERT INTO folders (parent_id, name, kind, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![
                    parent_id.map(|p| p.as_i64()),
                    name,
                    kind.to_string(),
                    now,
                ],
            )?;
            Ok(FolderId::from_raw(tx.last_insert_rowid()))
        })
    }

    /// Rename and/or move a folder. `new_parent_id = None` moves it to root
    /// level. Reserved roots are immutable; a folder may never become its
    /// own ancestor.
    #[instrument(skip(self), fields(folder_id = %folder_id))]
    pub fn rename_move(
        &self,
        folder_id: FolderId,
        new_name: &str,
        new_parent_id: Option<FolderId>,
    ) -> Result<(), StoreError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(StoreError::Validation("folder name must not be blank".into()));
        }

        let now = self.clock.now_str();
        self.db.with_tx(|tx| {
            let folder = fetch(tx, folder_id)?
                .ok_or_else(|| StoreError::NotFound(format!("folder {folder_id}")))?;
            if folder.is_reserved_root() {
                return Err(StoreError::Forbidden(format!(
                    "reserved root '{}' cannot be modified",
                    folder.name
                )));
            }
            if new_parent_id.is_none() {
                for other in [FolderKind::Bookmark, FolderKind::Block] {
                    if other != folder.kind && new_name.eq_ignore_ascii_case(other.root_name()) {
                        return Err(StoreError::Validation(format!(
                            "name '{new_name}' is reserved for the {other} root"
                        )));
                    }
                }
            }

            if let Some(pid) = new_parent_id {
                if pid == folder_id {
                    return Err(StoreError::Conflict(
                        "folder cannot be its own parent".into(),
                    ));
                }
                let parent = fetch(tx, pid)?
                    .ok_or_else(|| StoreError::NotFound(format!("folder {pid}")))?;
                if parent.kind != folder.kind {
                    return Err(StoreError::TypeMismatch {
                        expected: folder.kind,
                        actual: parent.kind,
                    });
                }
                if is_descendant_of(tx, pid, folder_id)? {
                    return Err(StoreError::Conflict(
                        "folder cannot be moved under its own descendant".into(),
                    ));
                }
            }

            if let Some(existing) = find_by_name(tx, new_name, new_parent_id, folder.kind)? {
                if existing.id != folder_id {
                    return Err(StoreError::Conflict(format!(
                        "folder '{new_name}' already exists at this level"
                    )));
                }
            }

            tx.execute(
                "UPDATE folders SET name = ?1, parent_id = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![
                    new_name,
                    new_parent_id.map(|p| p.as_i64()),
                    now,
                    folder_id.as_i64(),
                ],
            )?;
            Ok(())
        })
    }

    /// Delete a childless, non-root folder. Rules filed under it are
    /// unlinked (folder_id cleared), not deleted, in the same transaction.
    #[instrument(skip(self), fields(folder_id = %folder_id))]
    pub fn delete(&self, folder_id: FolderId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let folder = fetch(tx, folder_id)?
                .ok_or_else(|| StoreError::NotFound(format!("folder {folder_id}")))?;
            if folder.is_reserved_root() {
                return Err(StoreError::Forbidden(format!(
                    "reserved root '{}' cannot be deleted",
                    folder.name
                )));
            }
            if child_count(tx, folder_id)? > 0 {
                return Err(StoreError::Conflict(format!(
                    "folder '{}' has children",
                    folder.name
                )));
            }

            rules::clear_folder_links(tx, folder_id)?;
            tx.execute(
                "DELETE FROM folders WHERE id = ?1",
                [folder_id.as_i64()],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, folder_id: FolderId) -> Result<Folder, StoreError> {
        self.db.with_conn(|conn| {
            fetch(conn, folder_id)?
                .ok_or_else(|| StoreError::NotFound(format!("folder {folder_id}")))
        })
    }

    pub fn has_children(&self, folder_id: FolderId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| Ok(child_count(conn, folder_id)? > 0))
    }

    pub fn list_children(&self, parent_id: FolderId) -> Result<Vec<Folder>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {FOLDER_COLUMNS} FROM folders WHERE parent_id = ?1 ORDER BY lower(name)"
            );
            collect(conn, &sql, [parent_id.as_i64()])
        })
    }

    pub fn list_roots(&self, kind: FolderKind) -> Result<Vec<Folder>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {FOLDER_COLUMNS} FROM folders
                 WHERE parent_id IS NULL AND kind = ?1 ORDER BY lower(name)"
            );
            collect(conn, &sql, [kind.to_string()])
        })
    }

    pub fn list_all(&self, kind: FolderKind) -> Result<Vec<Folder>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {FOLDER_COLUMNS} FROM folders WHERE kind = ?1 ORDER BY id"
            );
            collect(conn, &sql, [kind.to_string()])
        })
    }

    pub fn find_by_name_and_parent(
        &self,
        name: &str,
        parent_id: Option<FolderId>,
        kind: FolderKind,
    ) -> Result<Option<Folder>, StoreError> {
        self.db.with_conn(|conn| find_by_name(conn, name, parent_id, kind))
    }
}

/// Folder lookup usable both standalone and inside a transaction scope
/// shared with the rule service.
pub(crate) fn fetch(conn: &Connection, id: FolderId) -> Result<Option<Folder>, StoreError> {
    let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.as_i64()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_folder(row)?)),
        None => Ok(None),
    }
}

fn find_by_name(
    conn: &Connection,
    name: &str,
    parent_id: Option<FolderId>,
    kind: FolderKind,
) -> Result<Option<Folder>, StoreError> {
    let sql = format!(
        "SELECT {FOLDER_COLUMNS} FROM folders
         WHERE COALESCE(parent_id, 0) = ?1 AND lower(name) = lower(?2) AND kind = ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params![
        parent_id.map_or(0, |p| p.as_i64()),
        name,
        kind.to_string(),
    ])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_folder(row)?)),
        None => Ok(None),
    }
}

fn child_count(conn: &Connection, id: FolderId) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM folders WHERE parent_id = ?1",
        [id.as_i64()],
        |row| row.get(0),
    )?)
}

/// Walk the ancestor chain of `folder` looking for `candidate`.
fn is_descendant_of(
    conn: &Connection,
    folder: FolderId,
    candidate: FolderId,
) -> Result<bool, StoreError> {
    let mut current = Some(folder);
    let mut seen = std::collections::HashSet::new();
    while let Some(id) = current {
        if id == candidate {
            return Ok(true);
        }
        if !seen.insert(id) {
            // Existing cycle in stored data; treat as descendant to refuse the move.
            return Ok(true);
        }
        current = conn
            .query_row(
                "SELECT parent_id FROM folders WHERE id = ?1",
                [id.as_i64()],
                |row| row.get::<_, Option<i64>>(0),
            )?
            .map(FolderId::from_raw);
    }
    Ok(false)
}

fn collect<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Folder>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(row_to_folder(row)?);
    }
    Ok(results)
}

fn row_to_folder(row: &rusqlite::Row<'_>) -> Result<Folder, StoreError> {
    let kind_str: String = row_helpers::get(row, 3, "folders", "kind")?;
    Ok(Folder {
        id: FolderId::from_raw(row_helpers::get(row, 0, "folders", "id")?),
        parent_id: row_helpers::get_opt::<i64>(row, 1, "folders", "parent_id")?
            .map(FolderId::from_raw),
        name: row_helpers::get(row, 2, "folders", "name")?,
        kind: row_helpers::parse_enum(&kind_str, "folders", "kind")?,
        created_at: row_helpers::get(row, 4, "folders", "created_at")?,
        updated_at: row_helpers::get(row, 5, "folders", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> FolderRepo {
        let db = Database::in_memory().unwrap();
        let repo = FolderRepo::new(db);
        repo.ensure_default_roots().unwrap();
        repo
    }

    #[test]
    fn default_roots_exist_with_fixed_ids() {
        let repo = setup();
        let bookmarks = repo.get(FolderKind::Bookmark.root_id()).unwrap();
        assert_eq!(bookmarks.name, "Bookmarks");
        assert_eq!(bookmarks.kind, FolderKind::Bookmark);
        assert!(bookmarks.parent_id.is_none());

        let blocked = repo.get(FolderKind::Block.root_id()).unwrap();
        assert_eq!(blocked.name, "Blocked");
        assert_eq!(blocked.kind, FolderKind::Block);
    }

    #[test]
    fn ensure_default_roots_is_idempotent() {
        let repo = setup();
        repo.ensure_default_roots().unwrap();
        repo.ensure_default_roots().unwrap();
        assert_eq!(repo.list_roots(FolderKind::Bookmark).unwrap().len(), 1);
        assert_eq!(repo.list_roots(FolderKind::Block).unwrap().len(), 1);
    }

    #[test]
    fn create_under_root() {
        let repo = setup();
        let root = FolderKind::Bookmark.root_id();
        let id = repo.create("News", Some(root), FolderKind::Bookmark).unwrap();
        let folder = repo.get(id).unwrap();
        assert_eq!(folder.name, "News");
        assert_eq!(folder.parent_id, Some(root));
    }

    #[test]
    fn create_trims_name() {
        let repo = setup();
        let id = repo.create("  News  ", None, FolderKind::Bookmark).unwrap();
        assert_eq!(repo.get(id).unwrap().name, "News");
    }

    #[test]
    fn create_blank_name_fails() {
        let repo = setup();
        let result = repo.create("   ", None, FolderKind::Bookmark);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn create_reserved_name_for_wrong_kind_fails() {
        let repo = setup();
        let result = repo.create("Bookmarks", None, FolderKind::Block);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn recreating_reserved_root_returns_its_id() {
        let repo = setup();
        let id = repo.create("Bookmarks", None, FolderKind::Bookmark).unwrap();
        assert_eq!(id, FolderKind::Bookmark.root_id());
    }

    #[test]
    fn create_with_missing_parent_fails() {
        let repo = setup();
        let result = repo.create("News", Some(FolderId::from_raw(999)), FolderKind::Bookmark);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn create_under_wrong_kind_parent_fails() {
        let repo = setup();
        let result = repo.create(
            "News",
            Some(FolderKind::Block.root_id()),
            FolderKind::Bookmark,
        );
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn duplicate_name_at_same_level_fails_case_insensitively() {
        let repo = setup();
        let root = FolderKind::Bookmark.root_id();
        repo.create("News", Some(root), FolderKind::Bookmark).unwrap();
        let result = repo.create("news", Some(root), FolderKind::Bookmark);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn same_name_under_different_parents_is_allowed() {
        let repo = setup();
        let root = FolderKind::Bookmark.root_id();
        let a = repo.create("A", Some(root), FolderKind::Bookmark).unwrap();
        let b = repo.create("B", Some(root), FolderKind::Bookmark).unwrap();
        repo.create("News", Some(a), FolderKind::Bookmark).unwrap();
        repo.create("News", Some(b), FolderKind::Bookmark).unwrap();
    }

    #[test]
    fn rename_updates_name_and_timestamp() {
        let db = Database::in_memory().unwrap();
        let clock = Arc::new(beacon_core::FixedClock::at(
            chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        ));
        let repo = FolderRepo::with_clock(db, clock.clone());
        repo.ensure_default_roots().unwrap();

        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        clock.advance(chrono::Duration::hours(1));
        repo.rename_move(id, "Headlines", None).unwrap();

        let folder = repo.get(id).unwrap();
        assert_eq!(folder.name, "Headlines");
        assert!(folder.created_at < folder.updated_at);
    }

    #[test]
    fn move_under_new_parent() {
        let repo = setup();
        let root = FolderKind::Bookmark.root_id();
        let a = repo.create("A", Some(root), FolderKind::Bookmark).unwrap();
        let b = repo.create("B", Some(root), FolderKind::Bookmark).unwrap();
        repo.rename_move(b, "B", Some(a)).unwrap();
        assert_eq!(repo.get(b).unwrap().parent_id, Some(a));
    }

    #[test]
    fn rename_reserved_root_fails() {
        let repo = setup();
        let result = repo.rename_move(FolderKind::Bookmark.root_id(), "Favorites", None);
        assert!(matches!(result, Err(StoreError::Forbidden(_))));
    }

    #[test]
    fn folder_cannot_become_its_own_parent() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        let result = repo.rename_move(id, "News", Some(id));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn move_under_own_descendant_fails() {
        let repo = setup();
        let a = repo.create("A", None, FolderKind::Bookmark).unwrap();
        let b = repo.create("B", Some(a), FolderKind::Bookmark).unwrap();
        let c = repo.create("C", Some(b), FolderKind::Bookmark).unwrap();
        let result = repo.rename_move(a, "A", Some(c));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn move_to_wrong_kind_parent_fails() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        let result = repo.rename_move(id, "News", Some(FolderKind::Block.root_id()));
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn rename_into_occupied_name_fails() {
        let repo = setup();
        let root = FolderKind::Bookmark.root_id();
        repo.create("News", Some(root), FolderKind::Bookmark).unwrap();
        let other = repo.create("Tech", Some(root), FolderKind::Bookmark).unwrap();
        let result = repo.rename_move(other, "NEWS", Some(root));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn rename_to_reserved_name_of_other_kind_fails() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        let result = repo.rename_move(id, "Blocked", None);
        assert!(matches!(result, Err(StoreError::Validation(_))));
        let result = repo.rename_move(id, "blocked", None);
        assert!(matches!(result, Err(StoreError::Validation(_))));

        // The name is only reserved at root level.
        let parent = repo.create("A", None, FolderKind::Bookmark).unwrap();
        repo.rename_move(id, "Blocked", Some(parent)).unwrap();
        assert_eq!(repo.get(id).unwrap().name, "Blocked");
    }

    #[test]
    fn rename_to_own_name_is_allowed() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        repo.rename_move(id, "NEWS", None).unwrap();
        assert_eq!(repo.get(id).unwrap().name, "NEWS");
    }

    #[test]
    fn delete_reserved_root_fails() {
        let repo = setup();
        let result = repo.delete(FolderKind::Block.root_id());
        assert!(matches!(result, Err(StoreError::Forbidden(_))));
    }

    #[test]
    fn delete_with_children_fails() {
        let repo = setup();
        let a = repo.create("A", None, FolderKind::Bookmark).unwrap();
        repo.create("B", Some(a), FolderKind::Bookmark).unwrap();
        let result = repo.delete(a);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn delete_childless_folder_succeeds() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        repo.delete(id).unwrap();
        assert!(matches!(repo.get(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_missing_folder_fails() {
        let repo = setup();
        let result = repo.delete(FolderId::from_raw(999));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_children_and_has_children() {
        let repo = setup();
        let a = repo.create("A", None, FolderKind::Bookmark).unwrap();
        assert!(!repo.has_children(a).unwrap());
        repo.create("Z", Some(a), FolderKind::Bookmark).unwrap();
        repo.create("B", Some(a), FolderKind::Bookmark).unwrap();
        assert!(repo.has_children(a).unwrap());

        let children = repo.list_children(a).unwrap();
        assert_eq!(children.len(), 2);
        // Ordered by lowercase name
        assert_eq!(children[0].name, "B");
        assert_eq!(children[1].name, "Z");
    }

    #[test]
    fn list_roots_by_kind() {
        let repo = setup();
        repo.create("A", None, FolderKind::Bookmark).unwrap();
        repo.create("B", None, FolderKind::Block).unwrap();

        let bookmark_roots = repo.list_roots(FolderKind::Bookmark).unwrap();
        assert_eq!(bookmark_roots.len(), 2); // reserved root + A
        assert!(bookmark_roots.iter().all(|f| f.kind == FolderKind::Bookmark));
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let repo = setup();
        let id = repo.create("News", None, FolderKind::Bookmark).unwrap();
        let found = repo
            .find_by_name_and_parent("nEwS", None, FolderKind::Bookmark)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(repo
            .find_by_name_and_parent("News", None, FolderKind::Block)
            .unwrap()
            .is_none());
    }
}
