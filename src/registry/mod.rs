// src/registry/mod.rs
mod instance;
mod refresher;
mod snapshot;
mod source;

pub use instance::{AddressParseError, InstanceAddress, ServiceName};
pub use refresher::RegistryRefresher;
pub use snapshot::{InstanceRegistry, RegistryError, RegistrySnapshot, ServiceInstances};
pub use source::{HttpSource, InstanceSource, ServiceTable, SourceError, StaticSource};
