//! Session-aware client for the task monitoring API.
//!
//! [`ApiClient`] is the single gateway for outbound calls: it attaches the
//! session token, unwraps the response envelope, and turns server 401s into
//! exactly one redirect to the login page. [`BatchPoller`] tracks a batch
//! analysis across reloads on top of it.

pub mod api;
mod error;
mod gateway;
mod persist;
mod poller;
mod session;
mod settings;
mod store;

pub use api::{ExportScope, MetricsRange};
pub use error::ApiError;
pub use gateway::{ApiClient, ApiRequest};
pub use persist::StateDir;
pub use poller::{
    BatchBackend, BatchEvent, BatchEventSink, BatchPoller, ChannelEventSink, NullEventSink,
};
pub use session::{Expiry, HistoryNavigator, Navigator, SessionContext};
pub use settings::{ClientSettings, BASE_URL_ENV};
pub use store::{KeyValueStore, MemoryStore, RonFileStore, StoreError};
