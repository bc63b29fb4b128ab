#![forbid(unsafe_code)]

//! HTTP fetch layer for offcast.
//!
//! A thin wrapper over `reqwest` that fixes the policy every caller in this
//! workspace shares: a configured user-agent on every request, a per-request
//! timeout, typed errors with a retryability classification, and `Range`
//! headers only when a resume point demands one.

mod client;
mod error;
mod types;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

pub use client::{HttpClient, StreamResponse};
pub use error::{NetError, NetResult};
pub use types::{NetOptions, RangeSpec, RetryPolicy};

/// Streaming response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = NetResult<Bytes>> + Send>>;
