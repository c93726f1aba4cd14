//! Update records
//!
//! An update record is one cross-thread mutation or notification in flight.
//! Records are created on the control thread (or, for host-bound records,
//! on either thread), applied at most once, and always destructed on the
//! control thread by the [`EventHandler`]. Destruction is where every
//! deferred effect happens: host callbacks, payload frees and the
//! retain/release of the objects a record kept alive.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::handler::EventHandler;
use crate::host::HostValue;
use crate::object::ObjectId;
use crate::property::{Payload, PropertyId};

/// Lifecycle phase passed to a [`ValueCallback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Control thread, synchronously at enqueue
    Create,
    /// Render thread, once, when the render queue is drained
    Apply,
    /// Control thread, once, when the record is destructed
    Delete,
}

/// Collaborator hook bound to a [`ValueUpdate`]
pub type ValueCallback = Arc<dyn Fn(&EventHandler, &mut ValueUpdate, Phase) + Send + Sync>;

/// One-shot control-thread callback carried by a [`JsCallbackUpdate`]
pub type HostCallback = Box<dyn FnOnce(&EventHandler) + Send>;

/// Objects retained on behalf of a record, released at destruction
pub(crate) type HeldRefs = SmallVec<[ObjectId; 2]>;

// ============================================================================
// Property updates
// ============================================================================

/// Decoded host write to one property, applied on the render thread
pub struct PropertyUpdate {
    pub(crate) object: ObjectId,
    pub(crate) property: PropertyId,
    pub(crate) payload: Payload,
    pub(crate) retain_later: Option<ObjectId>,
    pub(crate) release_later: Option<ObjectId>,
    pub(crate) held: HeldRefs,
    pub(crate) applied: bool,
    pub(crate) finished: bool,
}

impl PropertyUpdate {
    pub(crate) fn new(object: ObjectId, property: PropertyId, payload: Payload) -> Self {
        Self {
            object,
            property,
            payload,
            retain_later: None,
            release_later: None,
            held: HeldRefs::new(),
            applied: false,
            finished: false,
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// Payload still carried by the record (taken when applied)
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn was_applied(&self) -> bool {
        self.applied
    }
}

impl fmt::Debug for PropertyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyUpdate")
            .field("object", &self.object)
            .field("property", &self.property)
            .field("payload", &self.payload)
            .field("applied", &self.applied)
            .finish()
    }
}

impl Drop for PropertyUpdate {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "property update {:?}/{} dropped without destruction",
                self.object,
                self.property
            );
        }
    }
}

// ============================================================================
// Value updates
// ============================================================================

/// What a [`ValueUpdate`] acts on
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTarget {
    /// A managed object, retained while the record is in flight
    Object(ObjectId),
    /// A raw resource id (texture, buffer) owned by the render thread
    Raw(u32),
    /// A host value, only ever inspected on the control thread
    Host(HostValue),
}

/// Three-phase collaborator record: CREATE, APPLY, DELETE
pub struct ValueUpdate {
    source: Option<ObjectId>,
    target: ValueTarget,
    payload: Option<Box<dyn Any + Send>>,
    callback: ValueCallback,
    pub(crate) held: HeldRefs,
    pub(crate) applied: bool,
    pub(crate) finished: bool,
}

impl ValueUpdate {
    pub(crate) fn new(
        source: Option<ObjectId>,
        target: ValueTarget,
        payload: Option<Box<dyn Any + Send>>,
        callback: ValueCallback,
    ) -> Self {
        Self {
            source,
            target,
            payload,
            callback,
            held: HeldRefs::new(),
            applied: false,
            finished: false,
        }
    }

    pub fn source(&self) -> Option<ObjectId> {
        self.source
    }

    pub fn target(&self) -> &ValueTarget {
        &self.target
    }

    pub fn target_object(&self) -> Option<ObjectId> {
        match self.target {
            ValueTarget::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Whether APPLY ran. False during DELETE means the record was
    /// cancelled (rejected, torn down, or its target destroyed first).
    pub fn was_applied(&self) -> bool {
        self.applied
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.as_mut()?.downcast_mut::<T>()
    }

    pub fn set_payload<T: Any + Send>(&mut self, value: T) {
        self.payload = Some(Box::new(value));
    }

    /// Take the payload out if it has type `T`.
    pub fn take_payload<T: Any>(&mut self) -> Option<T> {
        let boxed = self.payload.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.payload = Some(other);
                None
            }
        }
    }

    pub(crate) fn callback(&self) -> ValueCallback {
        self.callback.clone()
    }
}

impl fmt::Debug for ValueUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueUpdate")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("has_payload", &self.payload.is_some())
            .field("applied", &self.applied)
            .finish()
    }
}

impl Drop for ValueUpdate {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("value update {:?} dropped without destruction", self.target);
        }
    }
}

// ============================================================================
// Host-bound records
// ============================================================================

/// Push the current native value of a property to the host
#[derive(Debug, Clone, Copy)]
pub struct JsPropertyUpdate {
    pub object: ObjectId,
    pub property: PropertyId,
}

/// Deferred host callback: `apply` runs when the control queue is drained,
/// `done` when the record is destructed
pub struct JsCallbackUpdate {
    pub(crate) owner: Option<ObjectId>,
    pub(crate) apply: Option<HostCallback>,
    pub(crate) done: Option<HostCallback>,
}

impl JsCallbackUpdate {
    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }
}

impl fmt::Debug for JsCallbackUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsCallbackUpdate")
            .field("owner", &self.owner)
            .field("has_apply", &self.apply.is_some())
            .field("has_done", &self.done.is_some())
            .finish()
    }
}

/// One mutation or notification in flight
#[derive(Debug)]
pub enum UpdateRecord {
    Property(PropertyUpdate),
    Value(ValueUpdate),
    JsProperty(JsPropertyUpdate),
    JsCallback(JsCallbackUpdate),
}

impl UpdateRecord {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateRecord::Property(_) => "PropertyUpdate",
            UpdateRecord::Value(_) => "ValueUpdate",
            UpdateRecord::JsProperty(_) => "JSPropertyUpdate",
            UpdateRecord::JsCallback(_) => "JSCallbackUpdate",
        }
    }

    /// Whether the record belongs on the render queue
    pub fn runs_on_render(&self) -> bool {
        matches!(self, UpdateRecord::Property(_) | UpdateRecord::Value(_))
    }
}
