use beacon_core::{GroupField, HandlerFilter, QuerySpec, SortField, SortOrder};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::row_helpers;

/// Logical-field to physical-column mapping. Total: every sort field has
/// exactly one column; a new field without a mapping fails to compile.
fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "timestamp",
        SortField::Uri => "uri",
        SortField::Host => "host",
        SortField::Handler => "chosen_handler",
        SortField::Action => "action",
        SortField::Source => "source",
    }
}

/// Group-key expressions, likewise total. `Day` truncates to the UTC
/// calendar day regardless of the stored precision; NULL handlers group
/// under the empty-string key.
fn group_key_expr(field: GroupField) -> &'static str {
    match field {
        GroupField::Day => "date(timestamp)",
        GroupField::Action => "action",
        GroupField::Source => "source",
        GroupField::Host => "host",
        GroupField::Handler => "COALESCE(chosen_handler, '')",
    }
}

fn bind_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Engine-ready form of a [`QuerySpec`]: conjunctive predicate clauses with
/// bound parameters (never interpolated), an ORDER BY with id tie-break for
/// deterministic paging, and the optional group key. Building is pure and
/// deterministic: identical specs yield identical plans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPlan {
    void: bool,
    where_sql: String,
    params: Vec<String>,
    order_sql: String,
    group_expr: Option<&'static str>,
    group_order: SortOrder,
}

impl QueryPlan {
    /// The documented no-op plan: matches nothing, executes nothing.
    fn no_op() -> Self {
        Self {
            void: true,
            where_sql: String::new(),
            params: Vec::new(),
            order_sql: String::new(),
            group_expr: None,
            group_order: SortOrder::Desc,
        }
    }

    pub fn is_void(&self) -> bool {
        self.void
    }

    pub fn where_sql(&self) -> &str {
        &self.where_sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn order_sql(&self) -> &str {
        &self.order_sql
    }

    pub fn group_expr(&self) -> Option<&'static str> {
        self.group_expr
    }

    pub fn group_order(&self) -> SortOrder {
        self.group_order
    }
}

/// Translate a specification into a plan.
///
/// Grouped output always orders by count (direction from `group_order`);
/// requesting day grouping together with an explicit sort field is
/// contradictory and yields the no-op plan.
pub fn build_plan(spec: &QuerySpec) -> QueryPlan {
    if spec.group_field == Some(GroupField::Day) && spec.sort_field.is_some() {
        return QueryPlan::no_op();
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    let search = spec.search.trim();
    if !search.is_empty() {
        clauses.push("(uri LIKE ? ESCAPE '\\' OR host LIKE ? ESCAPE '\\')".into());
        let pattern = format!("%{}%", row_helpers::escape_like(search));
        params.push(pattern.clone());
        params.push(pattern);
    }

    if !spec.sources.is_empty() {
        clauses.push(format!("source IN ({})", placeholders(spec.sources.len())));
        params.extend(spec.sources.iter().map(ToString::to_string));
    }

    if !spec.actions.is_empty() {
        clauses.push(format!("action IN ({})", placeholders(spec.actions.len())));
        params.extend(spec.actions.iter().map(ToString::to_string));
    }

    if !spec.handlers.is_empty() {
        let named: Vec<&str> = spec
            .handlers
            .iter()
            .filter_map(|h| match h {
                HandlerFilter::NoHandler => None,
                HandlerFilter::Named(name) => Some(name.as_str()),
            })
            .collect();
        let wants_null = spec.handlers.contains(&HandlerFilter::NoHandler);

        if named.is_empty() {
            // Set contained only the no-handler marker.
            clauses.push("chosen_handler IS NULL".into());
        } else if wants_null {
            clauses.push(format!(
                "(chosen_handler IS NULL OR chosen_handler IN ({}))",
                placeholders(named.len())
            ));
            params.extend(named.iter().map(|n| n.to_string()));
        } else {
            clauses.push(format!(
                "chosen_handler IN ({})",
                placeholders(named.len())
            ));
            params.extend(named.iter().map(|n| n.to_string()));
        }
    }

    if !spec.hosts.is_empty() {
        clauses.push(format!(
            "lower(host) IN ({})",
            placeholders(spec.hosts.len())
        ));
        params.extend(spec.hosts.iter().map(|h| h.to_lowercase()));
    }

    if let Some(from) = &spec.from {
        clauses.push("timestamp >= ?".into());
        params.push(bind_ts(from));
    }
    if let Some(until) = &spec.until {
        clauses.push("timestamp <= ?".into());
        params.push(bind_ts(until));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let column = sort_column(spec.sort_field.unwrap_or(SortField::Timestamp));
    let direction = spec.sort_order.as_sql();
    let order_sql = format!(" ORDER BY {column} {direction}, id {direction}");

    QueryPlan {
        void: false,
        where_sql,
        params,
        order_sql,
        group_expr: spec.group_field.map(group_key_expr),
        group_order: spec.group_order,
    }
}
