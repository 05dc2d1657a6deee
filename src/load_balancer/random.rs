// src/load_balancer/random.rs
use crate::load_balancer::LoadBalancer;
use crate::registry::InstanceAddress;
use rand::seq::SliceRandom;

/// Uniform pick among the instances not yet tried.
#[derive(Debug, Default)]
pub struct RandomBalancer;

impl RandomBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomBalancer {
    fn select(
        &self,
        _service: &str,
        instances: &[InstanceAddress],
        _key: Option<&str>,
        tried: &[InstanceAddress],
    ) -> Option<InstanceAddress> {
        let candidates: Vec<&InstanceAddress> =
            instances.iter().filter(|i| !tried.contains(i)).collect();
        candidates.choose(&mut rand::thread_rng()).map(|i| (*i).clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
