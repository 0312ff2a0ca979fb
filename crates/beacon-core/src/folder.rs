use serde::{Deserialize, Serialize};

use crate::ids::FolderId;

/// Which side of the hierarchy a folder lives in. Immutable after creation;
/// a folder's kind always equals its parent's kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Bookmark,
    Block,
}

impl FolderKind {
    /// The reserved root folder for this kind. Both roots always exist once
    /// `ensure_default_roots` has run.
    pub const fn root_id(&self) -> FolderId {
        match self {
            Self::Bookmark => FolderId::from_raw(1),
            Self::Block => FolderId::from_raw(2),
        }
    }

    pub const fn root_name(&self) -> &'static str {
        match self {
            Self::Bookmark => "Bookmarks",
            Self::Block => "Blocked",
        }
    }
}

impl std::fmt::Display for FolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bookmark => write!(f, "bookmark"),
            Self::Block => write!(f, "block"),
        }
    }
}

impl std::str::FromStr for FolderKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(Self::Bookmark),
            "block" => Ok(Self::Block),
            other => Err(format!("unknown folder kind: {other}")),
        }
    }
}

/// Named node in a per-kind hierarchy. `parent_id = None` means root level.
/// (parent, lowercase name, kind) is unique across the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub kind: FolderKind,
    pub created_at: String,
    pub updated_at: String,
}

impl Folder {
    pub fn is_reserved_root(&self) -> bool {
        self.id == self.kind.root_id()
    }
}
