//! Rose Folder
//!
//! Local side of the working copy: binding markers and the folder index.
//!
//! # Core Concepts
//!
//! - [`Binding`]: `{isClass, object, lastUploadTimestamp?}` stored at the
//!   root of a bound directory
//! - [`MarkerStore`]: load/save/remove markers under a configurable name
//! - [`FolderIndex`]: depth-first scan that stops at the first marker per
//!   branch, with class/instance relationship queries
//!
//! # Example
//!
//! ```rust,ignore
//! let index = FolderIndex::scan(Path::new("."), &MarkerStore::default())?;
//! for entry in index.instances_of_class(class_dir.as_path()) {
//!     println!("{}", entry.path.display());
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod binding;
mod error;
mod index;

pub use binding::{Binding, MarkerStore, DEFAULT_MARKER_FILENAME};
pub use error::FolderError;
pub use index::{
    normalize_path, ClassGroup, FolderIndex, IndexEntry, Listing, Lookup, MalformedMarker,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
