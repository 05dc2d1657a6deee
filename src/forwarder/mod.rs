// src/forwarder/mod.rs
mod error;
mod forwarder;
mod request;
mod transport;

pub use error::{AttemptFailure, FailureReason, ForwardError};
pub use forwarder::{ForwardResult, LoadBalancingForwarder};
pub use request::{ForwardRequest, ForwardResponse};
pub use transport::{strip_hop_by_hop, HttpTransport, HyperTransport, TransportError};
