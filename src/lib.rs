//! Chorus inference backend library.
//!
//! Talks to a dozen incompatible chat-completion APIs through one contract and fans a
//! single user turn out to several of them at once.
//!
//! # Architecture
//!
//! - `model`: Provider adapters, SSE framing, and the request engine
//! - `runtime`: Concurrent fan-out sessions
//! - `bus`: Progress events for fan-out observers
//! - `config`: Service and engine configuration

pub mod bus;
pub mod config;
pub mod model;
pub mod runtime;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

/// Installs the `tracing` subscriber used by binaries. `RUST_LOG` wins when set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chorus=debug,info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
