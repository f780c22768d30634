//! Backchannel HTTP client building with middleware.

mod client;
mod retry;

pub use client::{BackchannelClient, BackchannelClientBuilder, HttpClientConfig};
pub use retry::BackoffPolicy;
