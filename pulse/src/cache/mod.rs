pub mod error;
pub mod fetch;
pub mod store;

pub use error::CacheError;
pub use fetch::{FetchOutcome, accept_all, fetch_and_cache};
pub use store::{CacheEntry, CacheLookup, CacheStore};
