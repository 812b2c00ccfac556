mod clock;
pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use db::DatabaseManager;
pub use error::{DbError, DbResult};
pub use memory::MemorySiteStore;
pub use store::SiteStore;
pub use types::*;
