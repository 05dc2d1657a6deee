// src/lib.rs
pub mod config;
pub mod forwarder;
pub mod load_balancer;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod server;

pub use forwarder::{ForwardError, ForwardRequest, ForwardResponse, ForwardResult, LoadBalancingForwarder};
pub use load_balancer::SelectionPolicy;
pub use registry::{InstanceAddress, InstanceRegistry, ServiceName};
