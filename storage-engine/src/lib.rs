//! In-memory backends for the pulse key-value port.

pub mod moka_store;

pub use moka_store::MokaKeyValueStore;
