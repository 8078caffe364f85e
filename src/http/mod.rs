//! Framework-agnostic helpers for the request handler that consumes verdicts.
//!
//! Nothing here performs I/O. A route extracts the client address and
//! identity with [`request`], calls the coordinator, and renders the verdict
//! with [`response`].

pub mod request;
pub mod response;

pub use request::extract_source_address;
pub use response::{RateLimitResponse, STATUS_OK, STATUS_TOO_MANY_REQUESTS};
