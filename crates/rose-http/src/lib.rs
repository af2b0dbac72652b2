//! Rose HTTP
//!
//! HTTP implementation of the [`Transport`](rose_remote::Transport) seam.
//!
//! # Core Concepts
//!
//! - [`Session`]: server location plus the current [`TokenPair`]; refreshing
//!   produces a new pair instead of mutating shared state
//! - [`HttpTransport`]: sends [`ApiRequest`](rose_remote::ApiRequest)s with
//!   a bearer token and retries once with refreshed tokens when the server
//!   rejects them
//! - [`TokenStore`]: the per-shell token file written by `rose login`
//!
//! # Example
//!
//! ```rust,ignore
//! let store = TokenStore::for_current_shell();
//! let session = Session::new("http://localhost:6001", "/api/v1", store.load()?);
//! let transport = HttpTransport::new(session, OAuthClient::default())?.with_token_store(store);
//! let api = ScenarioApi::new(Arc::new(transport));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod client;
mod error;
mod session;
mod store;

pub use client::{HttpTransport, DEFAULT_TIMEOUT_SECS};
pub use error::HttpError;
pub use session::{OAuthClient, Session, TokenPair};
pub use store::{TokenStore, TOKEN_FILE_PREFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
