use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, instrument};

use beacon_core::{Clock, FolderId, HostRule, RuleId, RuleStatus, SystemClock};

use crate::database::Database;
use crate::error::StoreError;
use crate::folders;
use crate::row_helpers;

const RULE_COLUMNS: &str =
    "id, host, status, folder_id, preferred_handler, preference_enabled, created_at, updated_at";

/// Rule consistency service. The single write path for host rules: every
/// save normalizes conflicting fields and validates the folder reference
/// inside one transaction, so no stored rule ever violates the status
/// invariants.
pub struct RuleService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RuleService {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create or update the rule for `host` (case-insensitive identity).
    ///
    /// Normalization before the upsert:
    /// - `Blocked` forces `preferred_handler = None` and `preference_enabled = false`
    /// - `None` forces `folder_id = None`
    /// - a surviving `folder_id` must reference an existing folder whose
    ///   kind matches the status
    #[instrument(skip(self), fields(status = %status))]
    pub fn save(
        &self,
        host: &str,
        status: RuleStatus,
        folder_id: Option<FolderId>,
        preferred_handler: Option<&str>,
        preference_enabled: bool,
    ) -> Result<RuleId, StoreError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(StoreError::Validation("host must not be blank".into()));
        }
        if status == RuleStatus::Unknown {
            return Err(StoreError::Validation(
                "unknown status cannot be saved".into(),
            ));
        }

        let now = self.clock.now_str();
        self.db.with_tx(|tx| {
            let existing = find_by_host(tx, host)?;

            let mut handler = preferred_handler.map(str::to_owned);
            let mut enabled = preference_enabled;
            let mut folder = folder_id;
            if status == RuleStatus::Blocked {
                handler = None;
                enabled = false;
            }
            if status == RuleStatus::None {
                folder = None;
            }

            if let Some(fid) = folder {
                let folder_row = folders::fetch(tx, fid)?
                    .ok_or_else(|| StoreError::NotFound(format!("folder {fid}")))?;
                // status != None here, so expected_kind is always present
                let expected = status.expected_kind().ok_or_else(|| {
                    StoreError::Validation(format!("status {status} cannot carry a folder"))
                })?;
                if folder_row.kind != expected {
                    return Err(StoreError::TypeMismatch {
                        expected,
                        actual: folder_row.kind,
                    });
                }
            }

            match existing {
                Some(rule) => {
                    tx.execute(
                        "UPDATE host_rules
                         SET host = ?1, status = ?2, folder_id = ?3, preferred_handler = ?4,
                             preference_enabled = ?5, updated_at = ?6
                         WHERE id = ?7",
                        rusqlite::params![
                            host,
                            status.to_string(),
                            folder.map(|f| f.as_i64()),
                            handler,
                            enabled,
                            now,
                            rule.id.as_i64(),
                        ],
                    )?;
                    Ok(rule.id)
                }
                None => {
                    tx.execute(
                        "INSERT INTO host_rules
                         (host, status, folder_id, preferred_handler, preference_enabled,
                          created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        rusqlite::params![
                            host,
                            status.to_string(),
                            folder.map(|f| f.as_i64()),
                            handler,
                            enabled,
                            now,
                        ],
                    )?;
                    Ok(RuleId::from_raw(tx.last_insert_rowid()))
                }
            }
        })
    }

    pub fn get(&self, id: RuleId) -> Result<HostRule, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {RULE_COLUMNS} FROM host_rules WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([id.as_i64()])?;
            match rows.next()? {
                Some(row) => row_to_rule(row),
                None => Err(StoreError::NotFound(format!("rule {id}"))),
            }
        })
    }

    pub fn get_by_host(&self, host: &str) -> Result<Option<HostRule>, StoreError> {
        self.db.with_conn(|conn| find_by_host(conn, host))
    }

    pub fn list(&self) -> Result<Vec<HostRule>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {RULE_COLUMNS} FROM host_rules ORDER BY lower(host)");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_rule(row)?);
            }
            Ok(results)
        })
    }

    /// Delete by id. Idempotent: deleting an absent rule is logged, not an error.
    #[instrument(skip(self), fields(rule_id = %id))]
    pub fn delete_by_id(&self, id: RuleId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let n = tx.execute("DELETE FROM host_rules WHERE id = ?1", [id.as_i64()])?;
            if n == 0 {
                debug!(rule_id = %id, "delete of absent rule ignored");
            }
            Ok(())
        })
    }

    /// Delete by host (case-insensitive). Idempotent like `delete_by_id`.
    #[instrument(skip(self))]
    pub fn delete_by_host(&self, host: &str) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let n = tx.execute(
                "DELETE FROM host_rules WHERE lower(host) = lower(?1)",
                [host],
            )?;
            if n == 0 {
                debug!(host, "delete of absent rule ignored");
            }
            Ok(())
        })
    }

    /// Clear the folder link on every rule filed under `folder_id`.
    /// The folder repo calls the transaction-scoped form during folder
    /// deletion; this standalone form exists for direct callers.
    #[instrument(skip(self), fields(folder_id = %folder_id))]
    pub fn clear_folder_association(&self, folder_id: FolderId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            clear_folder_links(tx, folder_id)?;
            Ok(())
        })
    }
}

/// Transaction-scoped unlink, shared with the folder repo so folder
/// deletion and rule unlinking commit atomically.
pub(crate) fn clear_folder_links(
    conn: &Connection,
    folder_id: FolderId,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE host_rules SET folder_id = NULL WHERE folder_id = ?1",
        [folder_id.as_i64()],
    )?)
}

fn find_by_host(conn: &Connection, host: &str) -> Result<Option<HostRule>, StoreError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM host_rules WHERE lower(host) = lower(?1)");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([host])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_rule(row)?)),
        None => Ok(None),
    }
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> Result<HostRule, StoreError> {
    let status_str: String = row_helpers::get(row, 2, "host_rules", "status")?;
    let status: RuleStatus = row_helpers::parse_enum(&status_str, "host_rules", "status")?;
    if status == RuleStatus::Unknown {
        return Err(StoreError::CorruptRow {
            table: "host_rules",
            column: "status",
            detail: format!("unknown variant: {status_str}"),
        });
    }
    Ok(HostRule {
        id: RuleId::from_raw(row_helpers::get(row, 0, "host_rules", "id")?),
        host: row_helpers::get(row, 1, "host_rules", "host")?,
        status,
        folder_id: row_helpers::get_opt::<i64>(row, 3, "host_rules", "folder_id")?
            .map(FolderId::from_raw),
        preferred_handler: row_helpers::get_opt(row, 4, "host_rules", "preferred_handler")?,
        preference_enabled: row_helpers::get(row, 5, "host_rules", "preference_enabled")?,
        created_at: row_helpers::get(row, 6, "host_rules", "created_at")?,
        updated_at: row_helpers::get(row, 7, "host_rules", "updated_at")?,
    })
}
