// Service exports
pub mod cache;
pub mod matching;
pub mod opt_in;
pub mod postgres;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use matching::MatchingService;
pub use opt_in::OptInService;
pub use postgres::PostgresStore;
pub use store::{EventStore, MemoryStore};
