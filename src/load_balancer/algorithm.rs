// src/load_balancer/algorithm.rs
use crate::registry::InstanceAddress;
use serde::{Deserialize, Serialize};

pub trait LoadBalancer: Send + Sync {
    /// Pick one instance not in `tried`. `None` once every instance has been tried.
    fn select(
        &self,
        service: &str,
        instances: &[InstanceAddress],
        key: Option<&str>,
        tried: &[InstanceAddress],
    ) -> Option<InstanceAddress>;

    /// Drop any selection state kept for `service`.
    fn reset(&self, _service: &str) {}

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    Random,
    StickyByKey,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::RoundRobin => "round_robin",
            SelectionPolicy::Random => "random",
            SelectionPolicy::StickyByKey => "sticky_by_key",
        }
    }
}

/// First untried instance walking forward from `start`, wrapping once.
pub(crate) fn probe_from(
    instances: &[InstanceAddress],
    start: usize,
    tried: &[InstanceAddress],
) -> Option<InstanceAddress> {
    let len = instances.len();
    (0..len)
        .map(|offset| &instances[(start + offset) % len])
        .find(|candidate| !tried.contains(candidate))
        .cloned()
}
