//! Test helpers shared by unit and integration tests

pub mod mock;

pub use mock::{MockTransport, RecordedRequest};
