// src/load_balancer/round_robin.rs
use super::algorithm::probe_from;
use crate::load_balancer::LoadBalancer;
use crate::registry::InstanceAddress;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through instances with one counter per service.
///
/// The counter is taken modulo the current list length, so a list that
/// shrinks between calls still yields a valid index.
pub struct RoundRobinBalancer {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    fn next_index(&self, service: &str) -> usize {
        if let Some(counter) = self.counters.get(service) {
            return counter.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(
        &self,
        service: &str,
        instances: &[InstanceAddress],
        _key: Option<&str>,
        tried: &[InstanceAddress],
    ) -> Option<InstanceAddress> {
        if instances.is_empty() {
            return None;
        }

        let index = self.next_index(service) % instances.len();
        probe_from(instances, index, tried)
    }

    fn reset(&self, service: &str) {
        self.counters.remove(service);
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
