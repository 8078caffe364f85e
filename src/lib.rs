//! Signup Guard - multi-scope rate limiting for account endpoints
//!
//! This crate bounds signup and login attempts per client address, per
//! email and system-wide at the same time. Each scope is a sliding window
//! approximated with two fixed buckets in a shared counter store (Redis),
//! evaluated concurrently and folded into one verdict. When the store is
//! unreachable the guard fails open.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
