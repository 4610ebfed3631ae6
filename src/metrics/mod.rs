//! Fire-and-forget metrics emission.

mod statsd;

pub use statsd::{StatsdClient, StatsdConfig};

use thiserror::Error;

/// Errors that can occur while setting up the metrics client.
///
/// Sending never fails from the caller's point of view; only resolving and
/// connecting the socket can.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },
    #[error("Failed to connect UDP socket: {0}")]
    Connect(#[from] std::io::Error),
}
