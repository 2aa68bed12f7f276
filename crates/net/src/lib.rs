#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for bundlefetch
//!
//! This crate provides the transports that stream bundle bytes (HTTP via
//! `reqwest`, local files via `file://` URLs) and the retry machinery that
//! wraps whole fetch and load operations.

mod client;
mod file;
pub mod retry;
mod transport;

pub use client::HttpTransport;
pub use file::FileTransport;
pub use retry::{
    always_retry, policy_from_config, predicate_for, retry_if_transient,
    ExponentialBackoffStrategy, FixedIntervalStrategy, NoRetryStrategy, RetryHandler,
    RetryPolicy,
};
pub use transport::{
    transport_result_of, ByteStream, SchemeRouter, Transport, TransportRequest,
    TransportResponse,
};
