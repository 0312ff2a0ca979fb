use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{UriAction, UriSource};

/// Sortable fields of the interaction history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Timestamp,
    Uri,
    Host,
    Handler,
    Action,
    Source,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Grouping dimension for aggregate counts. `Day` buckets by UTC calendar
/// day regardless of stored timestamp precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Day,
    Action,
    Source,
    Host,
    Handler,
}

/// Handler filter entry. `NoHandler` matches rows with a NULL handler and
/// may be combined with named handlers in one set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFilter {
    NoHandler,
    Named(String),
}

/// Declarative read specification: what to match, how to order, how to
/// group. Filters compose conjunctively; an empty spec matches everything.
/// Set fields are BTree-ordered so identical specs always build identical
/// plans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Case-insensitive substring match over uri or host.
    pub search: String,
    pub sources: BTreeSet<UriSource>,
    pub actions: BTreeSet<UriAction>,
    pub handlers: BTreeSet<HandlerFilter>,
    pub hosts: BTreeSet<String>,
    /// Inclusive timestamp range bounds.
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Explicit sort field. Leave `None` for the timestamp default; grouped
    /// queries order by count and ignore this entirely.
    pub sort_field: Option<SortField>,
    pub sort_order: SortOrder,
    pub group_field: Option<GroupField>,
    /// Direction for group-count ordering, independent of `sort_order`.
    pub group_order: SortOrder,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            search: String::new(),
            sources: BTreeSet::new(),
            actions: BTreeSet::new(),
            handlers: BTreeSet::new(),
            hosts: BTreeSet::new(),
            from: None,
            until: None,
            sort_field: None,
            sort_order: SortOrder::Desc,
            group_field: None,
            group_order: SortOrder::Desc,
        }
    }
}

impl QuerySpec {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.sources.is_empty()
            && self.actions.is_empty()
            && self.handlers.is_empty()
            && self.hosts.is_empty()
            && self.from.is_none()
            && self.until.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_empty() {
        let spec = QuerySpec::default();
        assert!(spec.is_empty());
        assert_eq!(spec.sort_field, None);
        assert_eq!(spec.sort_order, SortOrder::Desc);
        assert_eq!(spec.group_field, None);
    }

    #[test]
    fn search_only_spec_is_not_empty() {
        let spec = QuerySpec {
            search: "example".into(),
            ..QuerySpec::default()
        };
        assert!(!spec.is_empty());
    }

    #[test]
    fn handler_filters_order_deterministically() {
        let mut set = BTreeSet::new();
        set.insert(HandlerFilter::Named("firefox".into()));
        set.insert(HandlerFilter::NoHandler);
        set.insert(HandlerFilter::Named("chrome".into()));
        let ordered: Vec<_> = set.into_iter().collect();
        assert_eq!(ordered[0], HandlerFilter::NoHandler);
        assert_eq!(ordered[1], HandlerFilter::Named("chrome".into()));
        assert_eq!(ordered[2], HandlerFilter::Named("firefox".into()));
    }

    #[test]
    fn sort_order_sql() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.as_sql(), "DESC");
    }
}
