//! Transport implementations.
//!
//! - [`http`] - the real HTTP boundary against the remote application
//! - [`rate_limited`] - a wrapper adding request pacing to any transport

pub mod http;
pub mod rate_limited;

pub use http::HttpTransport;
pub use rate_limited::RateLimitedTransport;
