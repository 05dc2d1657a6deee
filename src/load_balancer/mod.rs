// src/load_balancer/mod.rs
mod algorithm;
mod random;
mod round_robin;
mod sticky;

pub use algorithm::{LoadBalancer, SelectionPolicy};
pub use random::RandomBalancer;
pub use round_robin::RoundRobinBalancer;
pub use sticky::StickyBalancer;

use std::sync::Arc;

pub fn create_load_balancer(policy: SelectionPolicy) -> Arc<dyn LoadBalancer> {
    match policy {
        SelectionPolicy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        SelectionPolicy::Random => Arc::new(RandomBalancer::new()),
        SelectionPolicy::StickyByKey => Arc::new(StickyBalancer::new()),
    }
}

/// One balancer per policy, so the policy can be chosen per call while
/// selection state stays shared across calls.
pub struct Balancers {
    round_robin: Arc<dyn LoadBalancer>,
    random: Arc<dyn LoadBalancer>,
    sticky: Arc<dyn LoadBalancer>,
}

impl Balancers {
    pub fn new() -> Self {
        Self {
            round_robin: create_load_balancer(SelectionPolicy::RoundRobin),
            random: create_load_balancer(SelectionPolicy::Random),
            sticky: create_load_balancer(SelectionPolicy::StickyByKey),
        }
    }

    pub fn for_policy(&self, policy: SelectionPolicy) -> &dyn LoadBalancer {
        match policy {
            SelectionPolicy::RoundRobin => self.round_robin.as_ref(),
            SelectionPolicy::Random => self.random.as_ref(),
            SelectionPolicy::StickyByKey => self.sticky.as_ref(),
        }
    }

    pub fn reset(&self, service: &str) {
        self.round_robin.reset(service);
        self.random.reset(service);
        self.sticky.reset(service);
    }
}

impl Default for Balancers {
    fn default() -> Self {
        Self::new()
    }
}
