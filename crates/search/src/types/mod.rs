//! Core types for the search layer.
//!
//! - [`SearchableObject`], [`Indexable`] - Objects mirrored into the index
//! - [`PageCursor`] - Paging and sorting parameters with an output total
//! - [`PhysicalResourceDescriptor`] - Snapshot of a physical table
//!
//! # Examples
//!
//! ```
//! use kestrel_search::types::{Indexable, SearchableObject};
//! use serde_json::json;
//!
//! let note = SearchableObject::new("n1", "note", "acct-42")
//!     .with_field("title", json!("Meeting notes"));
//!
//! assert_eq!(note.object_type(), "note");
//! assert_eq!(note.field("title"), Some(&json!("Meeting notes")));
//! assert!(note.stored());
//! ```

mod object;
mod pagination;
mod resource;

pub use object::{Indexable, SearchableObject, fields};
pub use pagination::PageCursor;
pub use resource::{PhysicalResourceDescriptor, ResourceStatus};
