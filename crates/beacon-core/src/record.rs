use serde::{Deserialize, Serialize};

use crate::ids::{RecordId, RuleId};

/// Where an interaction originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriSource {
    Intent,
    Clipboard,
    Manual,
}

impl std::fmt::Display for UriSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Clipboard => write!(f, "clipboard"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for UriSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent" => Ok(Self::Intent),
            "clipboard" => Ok(Self::Clipboard),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown uri source: {other}")),
        }
    }
}

/// What happened to the interaction. `Unknown` is a parse fallback only and
/// is rejected before anything reaches storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriAction {
    Dismissed,
    BlockedEnforced,
    PreferenceSet,
    OpenedOnce,
    OpenedByPreference,
    Unknown,
}

impl UriAction {
    /// Whether a record with this action bumps the chosen handler's usage stat.
    pub fn counts_toward_usage(&self) -> bool {
        matches!(self, Self::OpenedOnce | Self::OpenedByPreference)
    }
}

impl std::fmt::Display for UriAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dismissed => write!(f, "dismissed"),
            Self::BlockedEnforced => write!(f, "blocked_enforced"),
            Self::PreferenceSet => write!(f, "preference_set"),
            Self::OpenedOnce => write!(f, "opened_once"),
            Self::OpenedByPreference => write!(f, "opened_by_preference"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for UriAction {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dismissed" => Self::Dismissed,
            "blocked_enforced" => Self::BlockedEnforced,
            "preference_set" => Self::PreferenceSet,
            "opened_once" => Self::OpenedOnce,
            "opened_by_preference" => Self::OpenedByPreference,
            _ => Self::Unknown,
        })
    }
}

/// One immutable interaction-history entry. Never mutated after insert;
/// deleted only by bulk clear. `rule_id` survives deletion of the rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriRecord {
    pub id: RecordId,
    pub uri: String,
    pub host: String,
    pub timestamp: String,
    pub source: UriSource,
    pub action: UriAction,
    pub chosen_handler: Option<String>,
    pub rule_id: Option<RuleId>,
}

/// Aggregate usage counter per handler, bumped atomically when a qualifying
/// record is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserUsageStat {
    pub handler: String,
    pub usage_count: i64,
    pub last_used_at: String,
}
