//! Managed objects
//!
//! Managed objects are the reference-counted entities the host sees. They
//! live in a generation-indexed arena owned by the event handler, so a stale
//! [`ObjectId`] held by an in-flight record resolves to nothing instead of
//! dangling.
//!
//! Per-kind reactions to updates are supplied through [`ObjectBehavior`].

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::host::HostValue;
use crate::property::{Payload, Property, PropertyId};

new_key_type! {
    /// Handle to a managed object
    pub struct ObjectId;
}

/// Per-kind strategy for reacting to property updates
///
/// The default reactions apply the payload and do nothing else. Object kinds
/// backed by render resources override [`property_update`] to mark derived
/// state dirty, or [`sync_update`] to consume writes on the control thread.
///
/// Hooks run without the event handler's queue lock, on a copy of the
/// property that is written back afterwards, so they may call into the
/// handler. Each object's behaviour has its own lock: a hook must not write
/// to its own object from inside `sync_update`.
///
/// [`property_update`]: ObjectBehavior::property_update
/// [`sync_update`]: ObjectBehavior::sync_update
pub trait ObjectBehavior: Send {
    /// Type tag shown to the host and in logs
    fn kind(&self) -> &str;

    /// Control thread. Return true to consume a decoded host write before
    /// it is queued; the payload is then freed and nothing reaches the
    /// render thread.
    fn sync_update(&mut self, _property: &Property, _payload: &Payload) -> bool {
        false
    }

    /// Render thread. Apply a queued write.
    fn property_update(&mut self, property: &mut Property, payload: Payload) {
        property.apply(payload);
    }

    /// Control thread. Called once when the object is destroyed.
    fn destroy(&mut self) {}
}

/// A behaviour shared between the arena and the hook currently running it
pub(crate) type SharedBehavior = Arc<Mutex<Box<dyn ObjectBehavior>>>;

/// Behaviour for objects with no reactions beyond storing values
#[derive(Debug, Clone)]
pub struct BasicBehavior {
    kind: String,
}

impl BasicBehavior {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl ObjectBehavior for BasicBehavior {
    fn kind(&self) -> &str {
        &self.kind
    }
}

/// Entry in the object arena
pub struct ManagedObject {
    pub(crate) refs: u32,
    pub(crate) destroyed: bool,
    pub(crate) properties: SmallVec<[Property; 4]>,
    pub(crate) next_property_id: u32,
    /// Last value pushed to the host, per connected property
    pub(crate) host_view: FxHashMap<PropertyId, HostValue>,
    kind: String,
    pub(crate) behavior: SharedBehavior,
}

impl ManagedObject {
    pub(crate) fn new(behavior: Box<dyn ObjectBehavior>) -> Self {
        Self {
            refs: 1,
            destroyed: false,
            properties: SmallVec::new(),
            next_property_id: 0,
            host_view: FxHashMap::default(),
            kind: behavior.kind().to_string(),
            behavior: Arc::new(Mutex::new(behavior)),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Current reference count
    pub fn refs(&self) -> u32 {
        self.refs
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id() == id)
    }

    pub(crate) fn property_mut(&mut self, id: PropertyId) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.id() == id)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub(crate) fn allocate_property_id(&mut self) -> PropertyId {
        self.next_property_id += 1;
        PropertyId(self.next_property_id)
    }

    /// Mark destroyed. Returns the behaviour whose `destroy` hook is due,
    /// once; the caller runs it outside the queue lock.
    pub(crate) fn mark_destroyed(&mut self) -> Option<SharedBehavior> {
        if self.destroyed {
            return None;
        }
        self.destroyed = true;
        Some(self.behavior.clone())
    }
}

impl std::fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObject")
            .field("kind", &self.kind())
            .field("refs", &self.refs)
            .field("destroyed", &self.destroyed)
            .field("properties", &self.properties.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDestroy(Arc<AtomicUsize>);

    impl ObjectBehavior for CountingDestroy {
        fn kind(&self) -> &str {
            "Counting"
        }

        fn destroy(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_property_ids_start_at_one() {
        let mut obj = ManagedObject::new(Box::new(BasicBehavior::new("Rect")));
        assert_eq!(obj.allocate_property_id(), PropertyId(1));
        assert_eq!(obj.allocate_property_id(), PropertyId(2));
        assert_eq!(obj.kind(), "Rect");
        assert_eq!(obj.refs(), 1);
    }

    #[test]
    fn test_destroy_hook_handed_out_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut obj = ManagedObject::new(Box::new(CountingDestroy(count.clone())));
        let behavior = obj.mark_destroyed().unwrap();
        assert!(obj.mark_destroyed().is_none());
        assert!(obj.is_destroyed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        behavior.lock().destroy();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_by_name() {
        let mut obj = ManagedObject::new(Box::new(BasicBehavior::new("Rect")));
        let id = obj.allocate_property_id();
        obj.properties
            .push(Property::new("w", id, PropertyKind::Float, false));
        assert_eq!(obj.property_by_name("w").map(Property::id), Some(id));
        assert!(obj.property_by_name("h").is_none());
        assert!(obj.property_mut(id).is_some());
    }
}
