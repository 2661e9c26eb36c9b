//! Registry module for Quay REST API interactions
//!
//! The dispatcher bounds and retries calls per host; endpoints and response
//! types describe the small fixed slice of the API the replicator uses.

pub mod api_types;
pub mod dispatcher;
pub mod endpoints;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherStats};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};
