//! In-memory backends.
//!
//! [`MemoryIndex`] stands in for the search engine and [`MemoryStore`] for
//! the primary key-value store and its table admin. Both fully implement the
//! backend traits and are used by the crate's tests and for embedded use.
//!
//! Both can be switched to an unavailable state to exercise how the public
//! operations degrade on backend failures.

mod index;
mod matcher;
mod store;

pub use index::MemoryIndex;
pub use store::MemoryStore;
