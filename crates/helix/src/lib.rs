//! A Twitch Helix API client with cached app access tokens.
//!
//! The client obtains a short-lived app access token through the OAuth
//! client-credentials grant, caches it in an injected [`TokenStore`],
//! and uses it for timeout-bounded, read-only lookups of streams, users
//! and videos.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use helix_client::{HelixClient, MemoryTokenStore, RequestDispatcher, default_client};
//! # async fn doc_test() -> Result<(), helix_client::HelixError> {
//! let store = Arc::new(MemoryTokenStore::new());
//! let dispatcher = Arc::new(RequestDispatcher::with_default_timeout(default_client()));
//! let client = HelixClient::new(store, dispatcher, "my-client-id", "my-secret");
//!
//! if client.is_live("ninja").await {
//!     println!("live!");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod store;
pub mod token;

pub use client::{HELIX_BASE_URL, HelixClient};
pub use dispatch::{DEFAULT_TIMEOUT, RawResponse, RequestDispatcher, Transport, default_client};
pub use error::HelixError;
pub use models::{Stream, User, Video};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use token::{BearerAuth, DEFAULT_STORAGE_NAMESPACE, TokenManager, TokenRecord};
