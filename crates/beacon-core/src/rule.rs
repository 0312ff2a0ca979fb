use serde::{Deserialize, Serialize};

use crate::folder::FolderKind;
use crate::ids::{FolderId, RuleId};

/// Classification of a host. `Unknown` is a parse fallback only and is
/// rejected by the rule service before anything reaches storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    None,
    Bookmarked,
    Blocked,
    Unknown,
}

impl RuleStatus {
    /// The folder kind a rule with this status may be filed under.
    /// Total mapping: `None`/`Unknown` rules carry no folder at all.
    pub fn expected_kind(&self) -> Option<FolderKind> {
        match self {
            Self::None => None,
            Self::Bookmarked => Some(FolderKind::Bookmark),
            Self::Blocked => Some(FolderKind::Block),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bookmarked => write!(f, "bookmarked"),
            Self::Blocked => write!(f, "blocked"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => Self::None,
            "bookmarked" => Self::Bookmarked,
            "blocked" => Self::Blocked,
            _ => Self::Unknown,
        })
    }
}

/// Persisted classification + handler preference for one host.
///
/// Invariants (enforced by the rule service, checked by tests):
/// - status `None` ⇒ `folder_id` is `None`
/// - status `Blocked` ⇒ `preferred_handler` is `None` and `preference_enabled` is false
/// - a set `folder_id` references a folder whose kind matches `status.expected_kind()`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
    pub id: RuleId,
    pub host: String,
    pub status: RuleStatus,
    pub folder_id: Option<FolderId>,
    pub preferred_handler: Option<String>,
    pub preference_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [RuleStatus::None, RuleStatus::Bookmarked, RuleStatus::Blocked] {
            let parsed: RuleStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unrecognized_status_parses_as_unknown() {
        let parsed: RuleStatus = "BOOKMARKED".parse().unwrap();
        assert_eq!(parsed, RuleStatus::Unknown);
    }

    #[test]
    fn expected_kind_mapping() {
        assert_eq!(RuleStatus::None.expected_kind(), None);
        assert_eq!(
            RuleStatus::Bookmarked.expected_kind(),
            Some(FolderKind::Bookmark)
        );
        assert_eq!(RuleStatus::Blocked.expected_kind(), Some(FolderKind::Block));
        assert_eq!(RuleStatus::Unknown.expected_kind(), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&RuleStatus::Bookmarked).unwrap();
        assert_eq!(json, "\"bookmarked\"");
    }
}
