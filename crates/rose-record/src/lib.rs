//! Rose Record
//!
//! Flat-record plumbing for the RoseStudio REST interface.
//!
//! # Core Concepts
//!
//! - [`encode_request_fields`] / [`decode_response_fields`]: carry nested
//!   JSON through a store that only understands flat string fields
//! - [`interpret_response`]: success/error branching on a raw response
//! - [`ScenarioRecord`]: a scenario class or instance, decided once when
//!   the flat record is read
//! - [`ScenarioMetadata`]: typed view over the `__JSON` blob
//! - [`Query`]: structured predicate objects (`$like`, `$ilike`, `$isnull`)
//!
//! # Example
//!
//! ```rust,ignore
//! use rose_record::{decode_response_fields, encode_request_fields};
//!
//! let wire = encode_request_fields(&record);
//! let back = decode_response_fields(serde_json::Value::Object(wire));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod codec;
mod error;
mod metadata;
mod query;
mod record;

pub use codec::{
    decode_record, decode_response_fields, encode_request_fields, interpret_response,
    is_parse_failed, RawResponse, ResponseBody, ResponseMode, JSON_FIELD_SUFFIX, PARSE_FAILED,
};
pub use error::{RecordError, RemoteError};
pub use metadata::{Placeholder, ScenarioMetadata};
pub use query::{glob_to_like, Query};
pub use record::{field, looks_like_uuid, truthy, ScenarioKind, ScenarioRecord};

/// A flat key/value record as stored by the server
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
