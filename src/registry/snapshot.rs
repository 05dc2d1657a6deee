// src/registry/snapshot.rs
use super::instance::{InstanceAddress, ServiceName};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown service '{0}'")]
    UnknownService(ServiceName),
}

/// Instance list for one service, as of the registry version it was published in.
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceInstances {
    version: u64,
    instances: Vec<InstanceAddress>,
}

impl ServiceInstances {
    fn new(version: u64, instances: Vec<InstanceAddress>) -> Self {
        let mut seen = HashSet::with_capacity(instances.len());
        let instances = instances
            .into_iter()
            .filter(|addr| seen.insert(addr.clone()))
            .collect();
        Self { version, instances }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn instances(&self) -> &[InstanceAddress] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Immutable view of every registered service. Never mutated after publication.
#[derive(Debug)]
pub struct RegistrySnapshot {
    version: u64,
    published_at: DateTime<Utc>,
    services: HashMap<ServiceName, Arc<ServiceInstances>>,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            published_at: Utc::now(),
            services: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn get(&self, service: &str) -> Option<&Arc<ServiceInstances>> {
        self.services.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = (&ServiceName, &Arc<ServiceInstances>)> {
        self.services.iter()
    }

    fn next_with(&self, services: HashMap<ServiceName, Arc<ServiceInstances>>) -> Self {
        Self {
            version: self.version + 1,
            published_at: Utc::now(),
            services,
        }
    }
}

/// Published instance lists per service name.
///
/// Readers load the current snapshot without locking. Writers build a new
/// snapshot and swap it in, so a reader sees either the old or the new list
/// in full.
pub struct InstanceRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::empty()),
        }
    }

    /// Registry pre-populated with the given services in a single version.
    pub fn with_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<InstanceAddress>)>,
        S: Into<ServiceName>,
    {
        let registry = Self::new();
        registry.publish_all(services.into_iter().map(|(name, list)| (name.into(), list)).collect());
        registry
    }

    pub fn get(&self, service: &str) -> Result<Arc<ServiceInstances>, RegistryError> {
        self.current
            .load()
            .get(service)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownService(ServiceName::from(service)))
    }

    pub fn contains(&self, service: &str) -> bool {
        self.current.load().services.contains_key(service)
    }

    /// Replace the list for one service. An empty list keeps the service
    /// registered but with nothing to select.
    pub fn publish(&self, service: impl Into<ServiceName>, instances: Vec<InstanceAddress>) -> u64 {
        let service = service.into();
        let count = instances.len();

        let previous = self.current.rcu(|current| {
            let version = current.version + 1;
            let mut services = current.services.clone();
            services.insert(
                service.clone(),
                Arc::new(ServiceInstances::new(version, instances.clone())),
            );
            current.next_with(services)
        });
        let version = previous.version + 1;

        tracing::debug!(%service, instances = count, version, "published service instances");
        version
    }

    /// Replace every service at once. Services missing from `table` stay
    /// registered with an empty list.
    pub fn publish_all(&self, table: HashMap<ServiceName, Vec<InstanceAddress>>) -> u64 {
        let previous = self.current.rcu(|current| {
            let version = current.version + 1;
            let mut services: HashMap<_, _> = current
                .services
                .keys()
                .map(|name| (name.clone(), Arc::new(ServiceInstances::new(version, Vec::new()))))
                .collect();
            for (name, list) in &table {
                services.insert(
                    name.clone(),
                    Arc::new(ServiceInstances::new(version, list.clone())),
                );
            }
            current.next_with(services)
        });
        let version = previous.version + 1;

        tracing::info!(services = table.len(), version, "published registry snapshot");
        version
    }

    /// Forget a service entirely. Returns false if it was not registered.
    ///
    /// Selection state and gauges live outside the registry; use
    /// `LoadBalancingForwarder::deregister` to drop those too.
    pub fn deregister(&self, service: &str) -> bool {
        let mut removed = false;
        self.current.rcu(|current| {
            removed = current.services.contains_key(service);
            if !removed {
                return Arc::clone(current);
            }
            let mut services = current.services.clone();
            services.remove(service);
            Arc::new(current.next_with(services))
        });

        if removed {
            tracing::info!(service, "deregistered service");
        }
        removed
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn services(&self) -> Vec<ServiceName> {
        let mut names: Vec<_> = self.current.load().services.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn addrs(ports: &[u16]) -> Vec<InstanceAddress> {
        ports.iter().map(|p| InstanceAddress::new("127.0.0.1", *p)).collect()
    }

    #[test]
    fn unknown_service_is_distinct_from_empty() {
        let registry = InstanceRegistry::new();
        assert_eq!(
            registry.get("serviceC").unwrap_err(),
            RegistryError::UnknownService("serviceC".into())
        );

        registry.publish("serviceB", Vec::new());
        let list = registry.get("serviceB").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn publish_replaces_list_and_bumps_version() {
        let registry = InstanceRegistry::new();
        let v1 = registry.publish("serviceA", addrs(&[8001, 8002]));
        let v2 = registry.publish("serviceA", addrs(&[8003]));

        assert!(v2 > v1);
        let first = registry.snapshot();
        registry.publish("serviceB", addrs(&[8004]));
        assert!(registry.snapshot().published_at() >= first.published_at());

        let list = registry.get("serviceA").unwrap();
        assert_eq!(list.instances(), addrs(&[8003]).as_slice());
        assert_eq!(list.version(), v2);
    }

    #[test]
    fn held_list_is_not_affected_by_later_publish() {
        let registry = InstanceRegistry::new();
        registry.publish("serviceA", addrs(&[8001, 8002]));
        let held = registry.get("serviceA").unwrap();

        registry.publish("serviceA", addrs(&[9001]));
        assert_eq!(held.instances(), addrs(&[8001, 8002]).as_slice());
    }

    #[test]
    fn duplicate_addresses_are_collapsed() {
        let registry = InstanceRegistry::new();
        registry.publish("serviceA", addrs(&[8001, 8002, 8001]));
        assert_eq!(registry.get("serviceA").unwrap().instances(), addrs(&[8001, 8002]).as_slice());
    }

    #[test]
    fn publish_all_empties_missing_services() {
        let registry = InstanceRegistry::with_services([
            ("serviceA", addrs(&[8001])),
            ("serviceB", addrs(&[8002])),
        ]);

        let mut table = HashMap::new();
        table.insert(ServiceName::from("serviceA"), addrs(&[8005]));
        registry.publish_all(table);

        assert_eq!(registry.get("serviceA").unwrap().instances(), addrs(&[8005]).as_slice());
        assert!(registry.get("serviceB").unwrap().is_empty());
        assert_eq!(registry.services(), vec![ServiceName::from("serviceA"), "serviceB".into()]);
    }

    #[test]
    fn deregister_makes_service_unknown() {
        let registry = InstanceRegistry::with_services([("serviceA", addrs(&[8001]))]);
        let version = registry.version();

        assert!(registry.contains("serviceA"));
        assert!(registry.deregister("serviceA"));
        assert!(!registry.deregister("serviceA"));
        assert!(!registry.contains("serviceA"));
        assert!(registry.get("serviceA").is_err());
        assert_eq!(registry.version(), version + 1);
    }

    #[test]
    fn concurrent_reader_never_sees_mixed_list() {
        let old = addrs(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let new = addrs(&[100, 200, 300]);
        let registry = Arc::new(InstanceRegistry::with_services([("svc", old.clone())]));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let registry = registry.clone();
            let done = done.clone();
            let (old, new) = (old.clone(), new.clone());
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let list = registry.get("svc").unwrap();
                    let seen = list.instances();
                    assert!(seen == old.as_slice() || seen == new.as_slice());
                }
            })
        };

        for i in 0..2_000 {
            let list = if i % 2 == 0 { new.clone() } else { old.clone() };
            registry.publish("svc", list);
        }
        done.store(true, Ordering::Relaxed);
        reader.join().unwrap();
    }
}
