//! Capability registry
//!
//! Keyed lookup from a [`ServiceId`] (a GUID) to a registered capability.
//! The registry has no lifecycle logic of its own: the plugin host records
//! which module owns each entry and removes those entries when the module
//! goes away.
//!
//! One registry is created by whoever wires the player together and is
//! passed by `Arc` to the components that need lookup.

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Typed registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Well-known decoder service ids
pub mod ids {
    use super::ServiceId;

    pub const DECODER_WAV: ServiceId = ServiceId::from_u128(0x6f1c_2b0e_8a41_4d3e_9b55_1f0a_7c21_0001);
    pub const DECODER_FLAC: ServiceId = ServiceId::from_u128(0x6f1c_2b0e_8a41_4d3e_9b55_1f0a_7c21_0002);
    pub const DECODER_MPEG: ServiceId = ServiceId::from_u128(0x6f1c_2b0e_8a41_4d3e_9b55_1f0a_7c21_0003);
    /// Generic PCM decoder, the last resort for unknown extensions
    pub const DECODER_PCM: ServiceId = ServiceId::from_u128(0x6f1c_2b0e_8a41_4d3e_9b55_1f0a_7c21_0004);
}

/// A registered capability instance
#[derive(Clone)]
pub enum Capability {
    Decoder(Arc<dyn Decoder>),
    /// Anything else a module wants to share; consumers downcast
    Service(Arc<dyn Any + Send + Sync>),
}

impl Capability {
    pub fn as_decoder(&self) -> Option<Arc<dyn Decoder>> {
        match self {
            Capability::Decoder(decoder) => Some(Arc::clone(decoder)),
            Capability::Service(_) => None,
        }
    }

    /// Number of live references to the shared object, this one included
    pub fn holders(&self) -> usize {
        match self {
            Capability::Decoder(decoder) => Arc::strong_count(decoder),
            Capability::Service(service) => Arc::strong_count(service),
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Decoder(d) => write!(f, "Decoder({})", d.name()),
            Capability::Service(_) => f.write_str("Service(..)"),
        }
    }
}

/// Registry entry
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub name: String,
    /// Identity of the owning module (None = registered by the host)
    pub owner: Option<String>,
    pub capability: Capability,
}

impl ServiceDescriptor {
    pub fn new(id: ServiceId, name: impl Into<String>, capability: Capability) -> Self {
        Self {
            id,
            name: name.into(),
            owner: None,
            capability,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Keyed capability lookup
#[derive(Default)]
pub struct CapabilityRegistry {
    services: RwLock<HashMap<ServiceId, ServiceDescriptor>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Ids are unique: a second registration under the
    /// same id fails with `AlreadyInitialized`.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<()> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = services.get(&descriptor.id) {
            return Err(Error::AlreadyInitialized(format!(
                "service {} already registered as '{}'",
                descriptor.id, existing.name
            )));
        }
        debug!(
            "Registered service '{}' ({}) owner={:?}",
            descriptor.name, descriptor.id, descriptor.owner
        );
        services.insert(descriptor.id, descriptor);
        Ok(())
    }

    pub fn query(&self, id: ServiceId) -> Option<Capability> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|d| d.capability.clone())
    }

    pub fn query_decoder(&self, id: ServiceId) -> Option<Arc<dyn Decoder>> {
        self.query(id).and_then(|c| c.as_decoder())
    }

    pub fn descriptor(&self, id: ServiceId) -> Option<ServiceDescriptor> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn unregister(&self, id: ServiceId) -> Option<ServiceDescriptor> {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Ids registered by the module with identity `owner`, sorted
    pub fn owned_by(&self, owner: &str) -> Vec<ServiceId> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ServiceId> = services
            .values()
            .filter(|d| d.owner.as_deref() == Some(owner))
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids
    }

    /// Drop every entry owned by `owner`; returns how many were removed
    pub fn remove_owned_by(&self, owner: &str) -> usize {
        self.take_owned_by(owner).len()
    }

    /// Remove and return every entry owned by `owner`, sorted by id
    pub fn take_owned_by(&self, owner: &str) -> Vec<ServiceDescriptor> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<ServiceId> = services
            .values()
            .filter(|d| d.owner.as_deref() == Some(owner))
            .map(|d| d.id)
            .collect();
        let mut taken: Vec<ServiceDescriptor> =
            ids.iter().filter_map(|id| services.remove(id)).collect();
        taken.sort_by_key(|d| d.id);
        taken
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registration handle that stamps every entry with `owner`
    pub fn scoped<'a>(&'a self, owner: &'a str) -> ScopedRegistry<'a> {
        ScopedRegistry {
            registry: self,
            owner,
        }
    }
}

/// Registry view handed to a module during initialization.
///
/// Everything registered through it belongs to the module and disappears
/// with it.
pub struct ScopedRegistry<'a> {
    registry: &'a CapabilityRegistry,
    owner: &'a str,
}

impl<'a> ScopedRegistry<'a> {
    pub fn owner(&self) -> &str {
        self.owner
    }

    pub fn register(&self, id: ServiceId, name: &str, capability: Capability) -> Result<()> {
        self.registry
            .register(ServiceDescriptor::new(id, name, capability).owned_by(self.owner))
    }

    pub fn query(&self, id: ServiceId) -> Option<Capability> {
        self.registry.query(id)
    }

    pub fn query_decoder(&self, id: ServiceId) -> Option<Arc<dyn Decoder>> {
        self.registry.query_decoder(id)
    }
}
