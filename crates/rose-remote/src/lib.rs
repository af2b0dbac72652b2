//! Rose Remote
//!
//! Typed access to the RoseStudio REST interface behind a [`Transport`]
//! seam.
//!
//! # Core Concepts
//!
//! - [`Transport`]: one authenticated request/response exchange
//! - [`ApiRequest`]: method, path, query and codec-encoded payload
//! - [`ScenarioApi`]: scenario classes, instances, metadata and code
//!   archives
//! - [`Entity`]: server collections and their user-facing aliases
//!
//! # Example
//!
//! ```rust,ignore
//! let api = ScenarioApi::new(transport);
//! let classes = api.scenario_classes().await?;
//! let archive = api.fetch_code_archive(instance_uuid).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod api;
mod entity;
mod error;
mod transport;

pub use api::{ScenarioApi, DEFAULT_SYSTEM_FIELDS};
pub use entity::Entity;
pub use error::ApiError;
pub use transport::{ApiRequest, Method, Payload, Transport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
