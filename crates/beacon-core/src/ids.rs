use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! row_id {
    ($name:ident) => {
        /// Server-assigned row identifier. Zero means "not yet persisted".
        #[derive(
            Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const UNSAVED: Self = Self(0);

            pub const fn from_raw(v: i64) -> Self {
                Self(v)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }

            pub fn is_persisted(&self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

row_id!(RuleId);
row_id!(FolderId);
row_id!(RecordId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unsaved() {
        let id = RuleId::default();
        assert_eq!(id, RuleId::UNSAVED);
        assert!(!id.is_persisted());
    }

    #[test]
    fn nonzero_is_persisted() {
        assert!(FolderId::from_raw(1).is_persisted());
        assert!(RecordId::from_raw(42).is_persisted());
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = FolderId::from_raw(17);
        let s = id.to_string();
        let parsed: FolderId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_roundtrip() {
        let id = RuleId::from_raw(9);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "9");
        let parsed: RuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(RecordId::from_raw(1) < RecordId::from_raw(2));
    }
}
