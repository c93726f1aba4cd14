//! Event handler
//!
//! The event handler owns the managed-object arena and the three update
//! queues that connect the control thread (host side) with the render
//! thread:
//!
//! - **render queue** (control -> render): property and value updates waiting
//!   for their APPLY phase
//! - **free queue** (render -> control): drained records waiting for
//!   destruction
//! - **control queue** (either -> control): host-visible effects only
//!
//! One reentrant mutex guards all of it. Critical sections are short and
//! the lock is never held while a host callback, a collaborator's
//! [`ValueCallback`] or an [`ObjectBehavior`] hook runs, so all of them may
//! re-enter the handler freely.
//!
//! Reference counts only change on the control thread. The render thread
//! resolves objects through generation-checked ids under the lock and never
//! retains or releases.

use std::any::Any;
use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::ReentrantMutex;
use slotmap::SlotMap;
use smallvec::{smallvec, SmallVec};

use crate::error::{CoreError, Result};
use crate::host::HostValue;
use crate::object::{BasicBehavior, ManagedObject, ObjectBehavior, ObjectId, SharedBehavior};
use crate::property::{
    decode, Payload, Property, PropertyId, PropertyKind, PropertyRef, PropertyValue,
};
use crate::update::{
    HostCallback, JsCallbackUpdate, JsPropertyUpdate, Phase, PropertyUpdate, UpdateRecord,
    ValueCallback, ValueTarget, ValueUpdate,
};

/// Callback to wake the control thread (e.g. post a task to its event loop)
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Observer of every value pushed to the host
pub type HostListener = Arc<dyn Fn(ObjectId, PropertyId, &HostValue) + Send + Sync>;

/// Construction options for an [`EventHandler`]
#[derive(Clone)]
pub struct HandlerOptions {
    wake: Option<WakeCallback>,
    listener: Option<HostListener>,
    queue_warn_depth: usize,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            wake: None,
            listener: None,
            queue_warn_depth: 4096,
        }
    }
}

impl HandlerOptions {
    pub fn with_wake(mut self, wake: WakeCallback) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn with_listener(mut self, listener: HostListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Render queue depth past which a warning is logged
    pub fn with_queue_warn_depth(mut self, depth: usize) -> Self {
        self.queue_warn_depth = depth;
        self
    }
}

/// Handler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub render_queue: usize,
    pub free_queue: usize,
    pub control_queue: usize,
    pub live_objects: usize,
    pub objects_created: u64,
    pub retains: u64,
    pub releases: u64,
    pub applies: u64,
    pub deletes: u64,
    pub host_pushes: u64,
    pub dropped_writes: u64,
}

// ============================================================================
// Shared state
// ============================================================================

struct HandlerState {
    objects: SlotMap<ObjectId, ManagedObject>,
    render_queue: Vec<UpdateRecord>,
    free_queue: Vec<UpdateRecord>,
    control_queue: Vec<UpdateRecord>,
    destroyed: bool,
    stats: HandlerStats,
    /// Behaviours whose `destroy` hook runs once the lock is released
    teardown: Vec<SharedBehavior>,
}

impl HandlerState {
    fn is_live(&self, id: ObjectId) -> bool {
        self.objects.get(id).is_some_and(|obj| !obj.destroyed)
    }

    fn retain(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(id) {
            Some(obj) => {
                obj.refs += 1;
                self.stats.retains += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference; frees the object (and whatever its object
    /// properties referenced) when the count reaches zero.
    fn release(&mut self, id: ObjectId) {
        let mut work: SmallVec<[ObjectId; 4]> = smallvec![id];
        while let Some(id) = work.pop() {
            let Some(obj) = self.objects.get_mut(id) else {
                tracing::debug!("release of freed object {:?} ignored", id);
                continue;
            };
            self.stats.releases += 1;
            debug_assert!(obj.refs > 0);
            obj.refs = obj.refs.saturating_sub(1);
            if obj.refs > 0 {
                continue;
            }
            self.teardown.extend(obj.mark_destroyed());
            work.extend(obj.properties.iter().filter_map(|p| p.value().as_object()));
            if let Some(obj) = self.objects.remove(id) {
                tracing::trace!("freed {} {:?}", obj.kind(), id);
            }
        }
    }

    /// Validate and retain the object a decoded payload references.
    ///
    /// `None` means the payload is invalid (stale object id).
    fn admit(&mut self, payload: &Payload) -> Option<Option<ObjectId>> {
        match payload.as_ref().and_then(PropertyValue::as_object) {
            Some(id) if self.retain(id) => Some(Some(id)),
            Some(_) => None,
            None => Some(None),
        }
    }

    fn push_render(&mut self, record: UpdateRecord, warn_depth: usize) {
        self.render_queue.push(record);
        if self.render_queue.len() == warn_depth {
            tracing::warn!(
                "render queue reached {} records; is the render thread ticking?",
                warn_depth
            );
        }
    }
}

struct HandlerShared {
    state: ReentrantMutex<RefCell<HandlerState>>,
    control_thread: ThreadId,
    wake: Option<WakeCallback>,
    wake_pending: AtomicBool,
    listener: Option<HostListener>,
    queue_warn_depth: usize,
}

// ============================================================================
// Event handler
// ============================================================================

/// Owner of the object arena and the update queues
///
/// Cheap to clone; clones share the same queues. The thread that constructs
/// the handler becomes its control thread.
#[derive(Clone)]
pub struct EventHandler {
    shared: Arc<HandlerShared>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("control_thread", &self.shared.control_thread)
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        Self::with_options(HandlerOptions::default())
    }

    pub fn with_options(options: HandlerOptions) -> Self {
        let state = HandlerState {
            objects: SlotMap::with_key(),
            render_queue: Vec::new(),
            free_queue: Vec::new(),
            control_queue: Vec::new(),
            destroyed: false,
            stats: HandlerStats::default(),
            teardown: Vec::new(),
        };
        Self {
            shared: Arc::new(HandlerShared {
                state: ReentrantMutex::new(RefCell::new(state)),
                control_thread: thread::current().id(),
                wake: options.wake,
                wake_pending: AtomicBool::new(false),
                listener: options.listener,
                queue_warn_depth: options.queue_warn_depth,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HandlerState) -> R) -> R {
        let (result, teardown) = {
            let guard = self.shared.state.lock();
            let mut state = guard.borrow_mut();
            let result = f(&mut state);
            (result, mem::take(&mut state.teardown))
        };
        for behavior in teardown {
            behavior.lock().destroy();
        }
        result
    }

    pub fn is_control_thread(&self) -> bool {
        thread::current().id() == self.shared.control_thread
    }

    pub fn is_destroyed(&self) -> bool {
        self.with_state(|state| state.destroyed)
    }

    /// Schedule a control-thread drain. One-shot until the next control tick.
    fn wake(&self) {
        if let Some(wake) = &self.shared.wake {
            if !self.shared.wake_pending.swap(true, Ordering::AcqRel) {
                wake();
            }
        }
    }

    pub fn stats(&self) -> HandlerStats {
        self.with_state(|state| HandlerStats {
            render_queue: state.render_queue.len(),
            free_queue: state.free_queue.len(),
            control_queue: state.control_queue.len(),
            live_objects: state.objects.len(),
            ..state.stats
        })
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Create a managed object. The returned id carries the host's reference.
    pub fn create_object(&self, behavior: impl ObjectBehavior + 'static) -> ObjectId {
        debug_assert!(self.is_control_thread());
        self.with_state(|state| {
            let id = state.objects.insert(ManagedObject::new(Box::new(behavior)));
            state.stats.objects_created += 1;
            tracing::trace!("created {:?}", id);
            id
        })
    }

    /// Create an object with no per-kind reactions.
    pub fn create_basic_object(&self, kind: &str) -> ObjectId {
        self.create_object(BasicBehavior::new(kind))
    }

    /// Whether the id still resolves to an allocated object
    pub fn contains(&self, id: ObjectId) -> bool {
        self.with_state(|state| state.objects.contains_key(id))
    }

    pub fn object_kind(&self, id: ObjectId) -> Option<String> {
        self.with_state(|state| state.objects.get(id).map(|obj| obj.kind().to_string()))
    }

    pub fn ref_count(&self, id: ObjectId) -> Option<u32> {
        self.with_state(|state| state.objects.get(id).map(ManagedObject::refs))
    }

    /// True for destroyed objects and for ids that no longer resolve.
    pub fn is_object_destroyed(&self, id: ObjectId) -> bool {
        self.with_state(|state| !state.is_live(id))
    }

    /// Add a reference. Returns false for freed objects.
    pub fn retain(&self, id: ObjectId) -> bool {
        debug_assert!(self.is_control_thread());
        self.with_state(|state| state.retain(id))
    }

    /// Drop a reference (the host handle is one). Frees at zero.
    pub fn release(&self, id: ObjectId) {
        debug_assert!(self.is_control_thread());
        self.with_state(|state| state.release(id));
    }

    /// Mark the object destroyed. Idempotent; memory is reclaimed once the
    /// last reference is released. New writes to it are discarded and
    /// queued records skip their APPLY phase.
    pub fn destroy_object(&self, id: ObjectId) -> bool {
        debug_assert!(self.is_control_thread());
        self.with_state(|state| {
            match state.objects.get_mut(id).and_then(ManagedObject::mark_destroyed) {
                Some(behavior) => {
                    state.teardown.push(behavior);
                    true
                }
                None => false,
            }
        })
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Register a property on an object.
    ///
    /// With a `host_default` the property is connected to a host accessor:
    /// the default is decoded and applied immediately and later changes are
    /// pushed to the host.
    pub fn register_property(
        &self,
        object: ObjectId,
        name: &str,
        kind: PropertyKind,
        host_default: Option<&HostValue>,
    ) -> Result<PropertyId> {
        debug_assert!(self.is_control_thread());
        self.with_state(|state| {
            if state.destroyed {
                return Err(CoreError::HandlerDestroyed);
            }
            if !state.objects.contains_key(object) {
                return Err(CoreError::UnknownObject);
            }
            let payload = match host_default.map(|value| (value, decode(kind, value))) {
                Some((_, Some(payload))) => match state.admit(&payload) {
                    Some(_) => Some(payload),
                    None => None,
                },
                Some((value, None)) => {
                    tracing::debug!(
                        "ignoring {} default for '{}': host value is {}",
                        kind.name(),
                        name,
                        value.type_name()
                    );
                    None
                }
                None => None,
            };

            let obj = state.objects.get_mut(object).ok_or(CoreError::UnknownObject)?;
            let id = obj.allocate_property_id();
            let mut prop = Property::new(name, id, kind, host_default.is_some());
            if let Some(payload) = payload {
                prop.apply(payload);
            }
            if prop.is_connected() {
                obj.host_view.insert(id, prop.value().to_host());
            }
            obj.properties.push(prop);
            Ok(id)
        })
    }

    pub fn property_id(&self, object: ObjectId, name: &str) -> Option<PropertyId> {
        self.with_state(|state| {
            state
                .objects
                .get(object)?
                .property_by_name(name)
                .map(Property::id)
        })
    }

    pub fn property_by_name(&self, object: ObjectId, name: &str) -> Option<PropertyRef> {
        self.property_id(object, name)
            .map(|id| PropertyRef::new(object, id))
    }

    pub fn property_kind(&self, target: PropertyRef) -> Result<PropertyKind> {
        self.with_property(target, Property::kind)
    }

    /// Current native value
    pub fn value(&self, target: PropertyRef) -> Result<PropertyValue> {
        self.with_property(target, |p| p.value().clone())
    }

    /// Last value the host observed for a connected property
    pub fn host_value(&self, target: PropertyRef) -> Option<HostValue> {
        self.with_state(|state| {
            state
                .objects
                .get(target.object)?
                .host_view
                .get(&target.id)
                .cloned()
        })
    }

    fn with_property<R>(&self, target: PropertyRef, f: impl FnOnce(&Property) -> R) -> Result<R> {
        self.with_state(|state| {
            let obj = state
                .objects
                .get(target.object)
                .ok_or(CoreError::UnknownObject)?;
            let prop = obj
                .property(target.id)
                .ok_or(CoreError::UnknownProperty(target.id.0))?;
            Ok(f(prop))
        })
    }

    /// Set a property from native code.
    ///
    /// Unchanged values are a no-op. A change to a connected property is
    /// pushed to the host: directly on the control thread, through the
    /// control queue from any other thread. Object references can only be
    /// set on the control thread since they retain and release.
    pub fn set_value(&self, target: PropertyRef, value: impl Into<PropertyValue>) -> Result<()> {
        let value = value.into();
        let on_control = self.is_control_thread();
        let push = self.with_state(|state| -> Result<bool> {
            let obj = state
                .objects
                .get(target.object)
                .ok_or(CoreError::UnknownObject)?;
            let prop = obj
                .property(target.id)
                .ok_or(CoreError::UnknownProperty(target.id.0))?;
            if prop.kind() != value.kind() {
                return Err(CoreError::KindMismatch {
                    expected: prop.kind(),
                    actual: value.kind(),
                });
            }
            if prop.value() == &value {
                return Ok(false);
            }

            let mut released = None;
            if prop.kind() == PropertyKind::Object {
                if !on_control {
                    return Err(CoreError::type_error(
                        "object properties can only be set on the control thread",
                    ));
                }
                released = prop.value().as_object();
                if let Some(id) = value.as_object() {
                    if !state.retain(id) {
                        return Err(CoreError::UnknownObject);
                    }
                }
            }

            let obj = state
                .objects
                .get_mut(target.object)
                .ok_or(CoreError::UnknownObject)?;
            let destroyed = obj.destroyed;
            let changed = obj
                .property_mut(target.id)
                .is_some_and(|prop| prop.set_value(value));
            if let Some(id) = released {
                state.release(id);
            }
            Ok(changed && !destroyed)
        })?;

        if push {
            if on_control {
                self.push_to_host(target);
            } else {
                self.enqueue_host_push(target);
            }
        }
        Ok(())
    }

    /// Mirror a property's current value into the host view.
    fn push_to_host(&self, target: PropertyRef) {
        let pushed = self.with_state(|state| {
            let obj = state.objects.get_mut(target.object)?;
            if obj.destroyed {
                return None;
            }
            let host = {
                let prop = obj.property(target.id)?;
                if !prop.is_connected() {
                    return None;
                }
                prop.value().to_host()
            };
            obj.host_view.insert(target.id, host.clone());
            state.stats.host_pushes += 1;
            Some(host)
        });
        if let (Some(host), Some(listener)) = (pushed, &self.shared.listener) {
            listener(target.object, target.id, &host);
        }
    }

    fn enqueue_host_push(&self, target: PropertyRef) {
        let record = UpdateRecord::JsProperty(JsPropertyUpdate {
            object: target.object,
            property: target.id,
        });
        let queued = self.with_state(|state| {
            if state.destroyed {
                return false;
            }
            state.control_queue.push(record);
            true
        });
        if queued {
            self.wake();
        }
    }

    // ========================================================================
    // Enqueue
    // ========================================================================

    /// Queue a host write for the render thread.
    ///
    /// Returns false when the write was discarded: handler or object
    /// destroyed, unknown property, or a host value that does not decode for
    /// the property's kind. None of these are errors.
    pub fn enqueue_property_update(
        &self,
        object: ObjectId,
        property: PropertyId,
        value: &HostValue,
    ) -> bool {
        debug_assert!(self.is_control_thread());
        let admitted = self.with_state(|state| {
            if state.destroyed {
                tracing::debug!("write to {:?} rejected: handler destroyed", object);
                return None;
            }
            let obj = match state.objects.get(object) {
                None => {
                    tracing::debug!("write to {:?} discarded: no event handler owns it", object);
                    return None;
                }
                Some(obj) if obj.destroyed => {
                    tracing::debug!("write to destroyed {:?} discarded", object);
                    return None;
                }
                Some(obj) => obj,
            };
            let Some(prop) = obj.property(property) else {
                tracing::debug!("write to unknown property {} discarded", property);
                return None;
            };

            let kind = prop.kind();
            let Some(payload) = decode(kind, value) else {
                tracing::debug!(
                    "dropping {} write to {}: host value is {}",
                    kind.name(),
                    property,
                    value.type_name()
                );
                state.stats.dropped_writes += 1;
                return None;
            };
            let snapshot = (obj.behavior.clone(), prop.clone());
            let Some(payload_ref) = state.admit(&payload) else {
                tracing::debug!("dropping object write to {}: stale reference", property);
                state.stats.dropped_writes += 1;
                return None;
            };
            Some((snapshot, payload, payload_ref))
        });
        let Some(((behavior, prop), payload, payload_ref)) = admitted else {
            return false;
        };

        let consumed = behavior.lock().sync_update(&prop, &payload);

        let warn_depth = self.shared.queue_warn_depth;
        self.with_state(|state| {
            if consumed || state.destroyed {
                if let Some(id) = payload_ref {
                    state.release(id);
                }
                return consumed;
            }
            let mut record = PropertyUpdate::new(object, property, payload);
            if state.retain(object) {
                record.held.push(object);
            }
            record.held.extend(payload_ref);
            state.push_render(UpdateRecord::Property(record), warn_depth);
            true
        })
    }

    /// Queue a collaborator record for the render thread.
    ///
    /// CREATE runs synchronously before the record is queued. When the
    /// handler or the target object is already destroyed the record is
    /// rejected: CREATE and APPLY are skipped, DELETE still runs, and false
    /// is returned.
    pub fn enqueue_value_update(
        &self,
        source: Option<ObjectId>,
        target: ValueTarget,
        payload: Option<Box<dyn Any + Send>>,
        callback: ValueCallback,
    ) -> bool {
        debug_assert!(self.is_control_thread());
        let mut update = ValueUpdate::new(source, target, payload, callback);
        let admitted = self.with_state(|state| {
            if state.destroyed {
                return false;
            }
            if let Some(id) = update.target_object() {
                if !state.is_live(id) {
                    return false;
                }
            }
            for id in update.source().into_iter().chain(update.target_object()) {
                if state.retain(id) {
                    update.held.push(id);
                }
            }
            true
        });
        if !admitted {
            tracing::debug!("value update for {:?} rejected", update.target());
            self.destruct(UpdateRecord::Value(update));
            return false;
        }

        let callback = update.callback();
        callback(self, &mut update, Phase::Create);

        let warn_depth = self.shared.queue_warn_depth;
        let rejected = self.with_state(|state| {
            let record = UpdateRecord::Value(update);
            if state.destroyed {
                return Some(record);
            }
            state.push_render(record, warn_depth);
            None
        });
        match rejected {
            Some(record) => {
                self.destruct(record);
                false
            }
            None => true,
        }
    }

    /// Queue a host callback on the control queue. Safe from any thread.
    ///
    /// `apply` runs on the next control tick, `done` when the record is
    /// destructed right after. After teardown the record is rejected:
    /// `apply` never runs and `done` runs at destruction, immediately on the
    /// control thread or on its next tick otherwise.
    pub fn enqueue_js_callback(
        &self,
        owner: Option<ObjectId>,
        apply: Option<HostCallback>,
        done: Option<HostCallback>,
    ) -> bool {
        let record = UpdateRecord::JsCallback(JsCallbackUpdate { owner, apply, done });
        let rejected = self.with_state(|state| {
            if state.destroyed {
                return Some(record);
            }
            state.control_queue.push(record);
            None
        });
        match rejected {
            None => {
                self.wake();
                true
            }
            Some(record) => {
                if self.is_control_thread() {
                    self.destruct(record);
                } else {
                    tracing::debug!("host callback rejected: handler destroyed");
                    self.with_state(|state| state.free_queue.push(record));
                    self.wake();
                }
                false
            }
        }
    }

    /// Delete a render-thread resource without blocking: `delete` runs
    /// during the APPLY phase of a raw-id value update.
    pub fn release_resource_async<F>(&self, owner: Option<ObjectId>, resource: u32, delete: F) -> bool
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        let callback: ValueCallback = Arc::new(move |_, update, phase| {
            if phase == Phase::Apply {
                if let ValueTarget::Raw(id) = update.target() {
                    delete(*id);
                }
            }
        });
        self.enqueue_value_update(owner, ValueTarget::Raw(resource), None, callback)
    }

    // ========================================================================
    // Ticks
    // ========================================================================

    /// Render-thread tick: APPLY every queued record in FIFO order, then
    /// hand them all to the free queue. Returns the number drained.
    ///
    /// If a collaborator panics during APPLY, every drained record still
    /// reaches the free queue while the panic unwinds; the rest of the batch
    /// is not applied.
    pub fn process_render_queue(&self) -> usize {
        let records = self.with_state(|state| mem::take(&mut state.render_queue));
        if records.is_empty() {
            return 0;
        }
        let mut drained = DrainedRecords {
            handler: self,
            records,
        };
        for record in drained.records.iter_mut() {
            self.apply_render(record);
        }
        drained.records.len()
    }

    fn apply_render(&self, record: &mut UpdateRecord) {
        match record {
            UpdateRecord::Property(update) => {
                tracing::trace!("APPLY property {:?}/{}", update.object, update.property);
                self.apply_property(update);
            }
            UpdateRecord::Value(update) => {
                let live = self.with_state(|state| {
                    !state.destroyed && update.target_object().map_or(true, |id| state.is_live(id))
                });
                if !live {
                    tracing::debug!("skipping APPLY: target {:?} destroyed", update.target());
                    return;
                }
                let callback = update.callback();
                callback(self, update, Phase::Apply);
                update.applied = true;
                self.with_state(|state| state.stats.applies += 1);
            }
            other => panic!("{} reached the render dispatcher", other.name()),
        }
    }

    /// Run the object's `property_update` hook on a copy of the property,
    /// then write the result back.
    fn apply_property(&self, update: &mut PropertyUpdate) {
        let snapshot = self.with_state(|state| {
            if state.destroyed {
                return None;
            }
            let obj = state.objects.get(update.object)?;
            if obj.destroyed {
                tracing::debug!("skipping APPLY: {:?} destroyed before drain", update.object);
                return None;
            }
            let prop = obj.property(update.property)?.clone();
            Some((obj.behavior.clone(), prop))
        });
        let Some((behavior, mut prop)) = snapshot else {
            return;
        };
        behavior
            .lock()
            .property_update(&mut prop, mem::take(&mut update.payload));

        self.with_state(|state| {
            let Some(slot) = state
                .objects
                .get_mut(update.object)
                .and_then(|obj| obj.property_mut(update.property))
            else {
                return;
            };
            let kind = slot.kind();
            let before = slot.apply(Some(prop.into_value())).as_object();
            let after = slot.value().as_object();
            // Counts only move on the control thread: stage them on the record.
            if kind == PropertyKind::Object && before != after {
                update.release_later = before;
                update.retain_later = after;
            }
            update.applied = true;
            state.stats.applies += 1;
        });
    }

    /// Control-thread tick: destruct everything the render thread drained,
    /// then apply and destruct the control queue. Returns records handled.
    pub fn process_control_tick(&self) -> usize {
        debug_assert!(self.is_control_thread());
        self.shared.wake_pending.store(false, Ordering::Release);

        let freed = self.with_state(|state| mem::take(&mut state.free_queue));
        let mut count = freed.len();
        for record in freed {
            self.destruct(record);
        }

        let control = self.with_state(|state| mem::take(&mut state.control_queue));
        count += control.len();
        for record in control {
            self.apply_control(record);
        }
        count
    }

    fn apply_control(&self, mut record: UpdateRecord) {
        match &mut record {
            UpdateRecord::JsProperty(update) => {
                self.push_to_host(PropertyRef::new(update.object, update.property));
            }
            UpdateRecord::JsCallback(update) => {
                if let Some(apply) = update.apply.take() {
                    apply(self);
                }
            }
            UpdateRecord::Property(_) | UpdateRecord::Value(_) => {}
        }
        self.destruct(record);
    }

    /// Run a record's deferred effects and release what it held.
    fn destruct(&self, record: UpdateRecord) {
        match record {
            UpdateRecord::Property(mut update) => {
                update.payload = None;
                self.with_state(|state| {
                    if let Some(id) = update.retain_later.take() {
                        state.retain(id);
                    }
                    if let Some(id) = update.release_later.take() {
                        state.release(id);
                    }
                    for id in update.held.drain(..) {
                        state.release(id);
                    }
                    state.stats.deletes += 1;
                });
                update.finished = true;
            }
            UpdateRecord::Value(mut update) => {
                let callback = update.callback();
                callback(self, &mut update, Phase::Delete);
                self.with_state(|state| {
                    for id in update.held.drain(..) {
                        state.release(id);
                    }
                    state.stats.deletes += 1;
                });
                update.finished = true;
            }
            UpdateRecord::JsProperty(_) => {}
            UpdateRecord::JsCallback(mut update) => {
                if let Some(done) = update.done.take() {
                    done(self);
                }
            }
        }
    }

    /// Tear the handler down.
    ///
    /// Pending host effects are applied and destructed, records still on the
    /// render queue are destructed without APPLY, and the free queue is
    /// drained. Later enqueues are rejected. Stop the render thread first.
    pub fn destroy(&self) {
        debug_assert!(self.is_control_thread());
        let queues = self.with_state(|state| {
            if state.destroyed {
                return None;
            }
            state.destroyed = true;
            Some((
                mem::take(&mut state.control_queue),
                mem::take(&mut state.render_queue),
            ))
        });
        let Some((control, render)) = queues else {
            return;
        };
        tracing::debug!(
            "event handler teardown: {} control, {} render records",
            control.len(),
            render.len()
        );
        for record in control {
            self.apply_control(record);
        }
        for record in render {
            self.destruct(record);
        }
        let freed = self.with_state(|state| mem::take(&mut state.free_queue));
        for record in freed {
            self.destruct(record);
        }
    }
}

/// Records taken off the render queue; handed to the free queue on drop,
/// including while a panic unwinds
struct DrainedRecords<'a> {
    handler: &'a EventHandler,
    records: Vec<UpdateRecord>,
}

impl Drop for DrainedRecords<'_> {
    fn drop(&mut self) {
        let mut records = mem::take(&mut self.records);
        self.handler
            .with_state(|state| state.free_queue.append(&mut records));
        self.handler.wake();
    }
}
