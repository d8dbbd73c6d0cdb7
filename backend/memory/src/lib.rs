pub mod cache;
pub mod sqlite_store;
pub mod store;

pub use cache::{ActivityCache, RehydrationPolicy};
pub use sqlite_store::SqliteGateway;
pub use store::InMemoryGateway;
