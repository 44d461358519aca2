//! The physical metadata streams of a CLI module.
//!
//! [`Root`] parses the metadata root and stream directory; the heap readers
//! ([`StringsHeap`], [`BlobHeap`], [`UserStringsHeap`]) give bounds-checked
//! access to the `#Strings`, `#Blob` and `#US` heaps; [`TablesStream`]
//! dimensions the `#~` stream and serves row-level access to the metadata
//! tables.
//!
//! # Reference
//! - ECMA-335 6th Edition, Partition II, Section 24.2

mod blob;
mod root;
mod strings;
mod tables;
mod userstrings;

pub use blob::BlobHeap;
pub use root::{Root, StreamHeader};
pub use strings::StringsHeap;
pub use tables::{CodedIndex, RowCursor, TablesStream, TABLE_COUNT};
pub use userstrings::UserStringsHeap;
