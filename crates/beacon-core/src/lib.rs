pub mod clock;
pub mod folder;
pub mod ids;
pub mod query;
pub mod record;
pub mod rule;

pub use clock::{Clock, FixedClock, SystemClock};
pub use folder::{Folder, FolderKind};
pub use ids::{FolderId, RecordId, RuleId};
pub use query::{GroupField, HandlerFilter, QuerySpec, SortField, SortOrder};
pub use record::{BrowserUsageStat, UriAction, UriRecord, UriSource};
pub use rule::{HostRule, RuleStatus};
