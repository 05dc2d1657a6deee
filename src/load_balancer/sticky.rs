// src/load_balancer/sticky.rs
use super::algorithm::probe_from;
use crate::load_balancer::LoadBalancer;
use crate::registry::InstanceAddress;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps a caller key to a fixed slot: `hash(key) % len`. Failover walks
/// forward from that slot. A missing key hashes as "".
#[derive(Debug, Default)]
pub struct StickyBalancer;

impl StickyBalancer {
    pub fn new() -> Self {
        Self
    }

    fn slot(key: &str, len: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % len as u64) as usize
    }
}

impl LoadBalancer for StickyBalancer {
    fn select(
        &self,
        _service: &str,
        instances: &[InstanceAddress],
        key: Option<&str>,
        tried: &[InstanceAddress],
    ) -> Option<InstanceAddress> {
        if instances.is_empty() {
            return None;
        }

        let start = Self::slot(key.unwrap_or(""), instances.len());
        probe_from(instances, start, tried)
    }

    fn name(&self) -> &'static str {
        "sticky_by_key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addrs(n: u16) -> Vec<InstanceAddress> {
        (0..n).map(|i| InstanceAddress::new("10.1.0.1", 7000 + i)).collect()
    }

    #[test]
    fn failover_moves_to_next_slot() {
        let lb = StickyBalancer::new();
        let list = addrs(4);

        let first = lb.select("svc", &list, Some("user-42"), &[]).unwrap();
        let second = lb.select("svc", &list, Some("user-42"), &[first.clone()]).unwrap();

        let i = list.iter().position(|a| *a == first).unwrap();
        assert_eq!(second, list[(i + 1) % list.len()]);
    }

    #[test]
    fn missing_key_is_stable() {
        let lb = StickyBalancer::new();
        let list = addrs(3);
        let a = lb.select("svc", &list, None, &[]);
        let b = lb.select("svc", &list, Some(""), &[]);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn same_key_same_instance(key in ".{0,32}", len in 1u16..12) {
            let lb = StickyBalancer::new();
            let list = addrs(len);

            let first = lb.select("svc", &list, Some(key.as_str()), &[]);
            for _ in 0..5 {
                prop_assert_eq!(lb.select("svc", &list, Some(key.as_str()), &[]), first.clone());
            }
        }
    }
}
