use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use beacon_core::UriRecord;

use crate::database::Database;
use crate::error::StoreError;
use crate::query::QueryPlan;
use crate::records::{row_to_record, RECORD_COLUMNS};

/// One bounded slice of query results, keyed by position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub index: u32,
    pub records: Vec<UriRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Executes a [`QueryPlan`] incrementally. Every call re-runs against
/// current storage state; no snapshot is promised across calls, and none
/// of the operations mutates anything. A void plan yields empty results
/// without touching storage.
#[derive(Clone)]
pub struct Pager {
    db: Database,
    plan: QueryPlan,
    page_size: u32,
}

impl Pager {
    pub fn new(db: Database, plan: QueryPlan, page_size: u32) -> Self {
        Self {
            db,
            plan,
            page_size: page_size.max(1),
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch the page at `index`. Pages past the end are empty, not errors.
    #[instrument(skip(self))]
    pub fn page(&self, index: u32) -> Result<Page, StoreError> {
        if self.plan.is_void() {
            return Ok(Page {
                index,
                records: Vec::new(),
            });
        }
        let limit = self.page_size as u64;
        let offset = index as u64 * limit;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM uri_records{}{} LIMIT {limit} OFFSET {offset}",
            self.plan.where_sql(),
            self.plan.order_sql(),
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(self.plan.params()))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(Page { index, records })
        })
    }

    /// Count of rows matching the plan's predicates, ignoring sort/group.
    pub fn total_count(&self) -> Result<i64, StoreError> {
        if self.plan.is_void() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM uri_records{}",
            self.plan.where_sql()
        );
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                &sql,
                rusqlite::params_from_iter(self.plan.params()),
                |row| row.get(0),
            )?)
        })
    }

    /// One (key, count) pair per distinct group key, ordered by count per
    /// the plan's group order with the key as tie-break. Empty when the
    /// plan has no group field.
    pub fn group_counts(&self) -> Result<Vec<GroupCount>, StoreError> {
        let Some(expr) = self.plan.group_expr() else {
            return Ok(Vec::new());
        };
        if self.plan.is_void() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {expr} AS grp, COUNT(*) AS n FROM uri_records{}
             GROUP BY grp ORDER BY n {}, grp ASC",
            self.plan.where_sql(),
            self.plan.group_order().as_sql(),
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(self.plan.params()))?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(GroupCount {
                    key: row.get(0).map_err(|e| StoreError::CorruptRow {
                        table: "uri_records",
                        column: "group_key",
                        detail: e.to_string(),
                    })?,
                    count: row.get(1)?,
                });
            }
            Ok(results)
        })
    }

    /// One (day, count) pair per distinct UTC day bucket, ordered by day.
    pub fn date_counts(&self) -> Result<Vec<DateCount>, StoreError> {
        if self.plan.is_void() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT date(timestamp) AS day, COUNT(*) AS n FROM uri_records{}
             GROUP BY day ORDER BY day ASC",
            self.plan.where_sql(),
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(self.plan.params()))?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0).map_err(|e| StoreError::CorruptRow {
                    table: "uri_records",
                    column: "timestamp",
                    detail: e.to_string(),
                })?;
                let day = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                    StoreError::CorruptRow {
                        table: "uri_records",
                        column: "timestamp",
                        detail: format!("bad day bucket '{raw}': {e}"),
                    }
                })?;
                results.push(DateCount {
                    day,
                    count: row.get(1)?,
                });
            }
            Ok(results)
        })
    }

    /// Push-based page subscription. Emits the page at `index` immediately,
    /// then again after every committed write; storage failures are
    /// surfaced per emission rather than ending the stream. Cancelling the
    /// token, or dropping the stream, stops re-evaluation with no partial
    /// side effects.
    pub fn subscribe(
        &self,
        index: u32,
        cancel: CancellationToken,
    ) -> ReceiverStream<Result<Page, StoreError>> {
        let (tx, rx) = mpsc::channel(8);
        let pager = self.clone();
        let mut feed = pager.db.change_feed();
        tokio::spawn(async move {
            if tx.send(pager.page(index)).await.is_err() {
                return;
            }
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = feed.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if tx.send(pager.page(index)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        ReceiverStream::new(rx)
    }
}
