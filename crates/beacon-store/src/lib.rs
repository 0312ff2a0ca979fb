pub mod database;
pub mod error;
pub mod folders;
pub mod paging;
pub mod query;
pub mod records;
pub mod row_helpers;
pub mod rules;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use folders::FolderRepo;
pub use paging::{DateCount, GroupCount, Page, Pager};
pub use query::{build_plan, QueryPlan};
pub use records::RecordRepo;
pub use rules::RuleService;
