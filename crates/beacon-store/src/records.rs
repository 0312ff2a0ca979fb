use std::sync::Arc;

use tracing::instrument;
use url::Url;

use beacon_core::{
    BrowserUsageStat, Clock, RecordId, RuleId, SystemClock, UriAction, UriRecord, UriSource,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub(crate) const RECORD_COLUMNS: &str =
    "id, uri, host, timestamp, source, action, chosen_handler, rule_id";

/// Append-only interaction history. Rows are never mutated; deletion is
/// bulk clear only. Qualifying appends bump the chosen handler's usage
/// stat in the same transaction.
pub struct RecordRepo {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RecordRepo {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    #[instrument(skip(self), fields(source = %source, action = %action))]
    pub fn append(
        &self,
        uri: &str,
        host: &str,
        source: UriSource,
        action: UriAction,
        chosen_handler: Option<&str>,
        rule_id: Option<RuleId>,
    ) -> Result<RecordId, StoreError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(StoreError::Validation("host must not be blank".into()));
        }
        if action == UriAction::Unknown {
            return Err(StoreError::Validation(
                "unknown action cannot be recorded".into(),
            ));
        }
        // Url::parse rejects relative references, so success means absolute.
        Url::parse(uri)
            .map_err(|e| StoreError::Validation(format!("invalid uri '{uri}': {e}")))?;

        let now = self.clock.now_str();
        self.db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO uri_records (uri, host, timestamp, source, action, chosen_handler, rule_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    uri,
                    host,
                    now,
                    source.to_string(),
                    action.to_string(),
                    chosen_handler,
                    rule_id.map(|r| r.as_i64()),
                ],
            )?;
            let id = RecordId::from_raw(tx.last_insert_rowid());

            if action.counts_toward_usage() {
                if let Some(handler) = chosen_handler {
                    tx.execute(
                        "INSERT INTO browser_usage_stats (handler, usage_count, last_used_at)
                         VALUES (?1, 1, ?2)
                         ON CONFLICT(handler) DO UPDATE SET
                             usage_count = usage_count + 1,
                             last_used_at = excluded.last_used_at",
                        rusqlite::params![handler, now],
                    )?;
                }
            }

            Ok(id)
        })
    }

    /// Bulk clear of the whole history. The only way records are deleted.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<usize, StoreError> {
        self.db
            .with_tx(|tx| Ok(tx.execute("DELETE FROM uri_records", [])?))
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM uri_records", [], |row| row.get(0))?)
        })
    }

    /// Usage stats, most-used first.
    pub fn usage_stats(&self) -> Result<Vec<BrowserUsageStat>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT handler, usage_count, last_used_at FROM browser_usage_stats
                 ORDER BY usage_count DESC, handler ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(BrowserUsageStat {
                    handler: row_helpers::get(row, 0, "browser_usage_stats", "handler")?,
                    usage_count: row_helpers::get(row, 1, "browser_usage_stats", "usage_count")?,
                    last_used_at: row_helpers::get(row, 2, "browser_usage_stats", "last_used_at")?,
                });
            }
            Ok(results)
        })
    }
}

pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> Result<UriRecord, StoreError> {
    let source_str: String = row_helpers::get(row, 4, "uri_records", "source")?;
    let action_str: String = row_helpers::get(row, 5, "uri_records", "action")?;
    let action: UriAction = row_helpers::parse_enum(&action_str, "uri_records", "action")?;
    if action == UriAction::Unknown {
        return Err(StoreError::CorruptRow {
            table: "uri_records",
            column: "action",
            detail: format!("unknown variant: {action_str}"),
        });
    }
    Ok(UriRecord {
        id: RecordId::from_raw(row_helpers::get(row, 0, "uri_records", "id")?),
        uri: row_helpers::get(row, 1, "uri_records", "uri")?,
        host: row_helpers::get(row, 2, "uri_records", "host")?,
        timestamp: row_helpers::get(row, 3, "uri_records", "timestamp")?,
        source: row_helpers::parse_enum(&source_str, "uri_records", "source")?,
        action,
        chosen_handler: row_helpers::get_opt(row, 6, "uri_records", "chosen_handler")?,
        rule_id: row_helpers::get_opt::<i64>(row, 7, "uri_records", "rule_id")?
            .map(RuleId::from_raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::FixedClock;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn setup() -> (RecordRepo, Arc<FixedClock>) {
        let db = Database::in_memory().unwrap();
        let clock = Arc::new(FixedClock::at(t0()));
        (RecordRepo::with_clock(db, clock.clone()), clock)
    }

    #[test]
    fn append_record() {
        let (repo, _clock) = setup();
        let id = repo
            .append(
                "https://example.com/page",
                "example.com",
                UriSource::Intent,
                UriAction::Dismissed,
                None,
                None,
            )
            .unwrap();
        assert!(id.is_persisted());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn append_uses_injected_clock() {
        let (repo, clock) = setup();
        repo.append(
            "https://example.com/",
            "example.com",
            UriSource::Manual,
            UriAction::OpenedOnce,
            Some("firefox"),
            None,
        )
        .unwrap();

        let stats = repo.usage_stats().unwrap();
        assert_eq!(stats[0].last_used_at, clock.now_str());
    }

    #[test]
    fn relative_uri_fails() {
        let (repo, _clock) = setup();
        let result = repo.append(
            "/just/a/path",
            "example.com",
            UriSource::Intent,
            UriAction::Dismissed,
            None,
            None,
        );
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn blank_host_fails() {
        let (repo, _clock) = setup();
        let result = repo.append(
            "https://example.com/",
            " ",
            UriSource::Intent,
            UriAction::Dismissed,
            None,
            None,
        );
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn unknown_action_fails() {
        let (repo, _clock) = setup();
        let result = repo.append(
            "https://example.com/",
            "example.com",
            UriSource::Intent,
            UriAction::Unknown,
            None,
            None,
        );
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn open_actions_increment_usage_stats() {
        let (repo, clock) = setup();
        repo.append(
            "https://a.com/",
            "a.com",
            UriSource::Intent,
            UriAction::OpenedOnce,
            Some("firefox"),
            None,
        )
        .unwrap();
        clock.advance(Duration::minutes(5));
        repo.append(
            "https://b.com/",
            "b.com",
            UriSource::Intent,
            UriAction::OpenedByPreference,
            Some("firefox"),
            None,
        )
        .unwrap();
        repo.append(
            "https://c.com/",
            "c.com",
            UriSource::Intent,
            UriAction::OpenedOnce,
            Some("chrome"),
            None,
        )
        .unwrap();

        let stats = repo.usage_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].handler, "firefox");
        assert_eq!(stats[0].usage_count, 2);
        assert_eq!(stats[0].last_used_at, clock.now_str());
        assert_eq!(stats[1].handler, "chrome");
        assert_eq!(stats[1].usage_count, 1);
    }

    #[test]
    fn non_open_actions_do_not_touch_usage_stats() {
        let (repo, _clock) = setup();
        repo.append(
            "https://a.com/",
            "a.com",
            UriSource::Intent,
            UriAction::PreferenceSet,
            Some("firefox"),
            None,
        )
        .unwrap();
        repo.append(
            "https://a.com/",
            "a.com",
            UriSource::Intent,
            UriAction::OpenedOnce,
            None,
            None,
        )
        .unwrap();
        assert!(repo.usage_stats().unwrap().is_empty());
    }

    #[test]
    fn clear_removes_all_records_but_keeps_stats() {
        let (repo, _clock) = setup();
        repo.append(
            "https://a.com/",
            "a.com",
            UriSource::Intent,
            UriAction::OpenedOnce,
            Some("firefox"),
            None,
        )
        .unwrap();
        repo.append(
            "https://b.com/",
            "b.com",
            UriSource::Manual,
            UriAction::Dismissed,
            None,
            None,
        )
        .unwrap();

        let removed = repo.clear().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count().unwrap(), 0);
        // Usage counters are aggregates, not history; they survive a clear.
        assert_eq!(repo.usage_stats().unwrap().len(), 1);
    }
}
