//! Animation scheduler
//!
//! Registry of property animations, ticked once per render frame. Each tick
//! writes the interpolated values straight into their properties through the
//! event handler; host-visible effects (pushes, `then` callbacks, the final
//! `stop()`) travel through the control queue.
//!
//! Lifecycle of an animation: `created -> running -> ended -> destroyed`.
//! [`AnimationScheduler::create`] binds it to a numeric property,
//! [`start`](AnimationScheduler::start) sets it running, the render tick ends
//! it, and [`stop`](AnimationScheduler::stop) (queued automatically on end)
//! destroys it.
//!
//! Lock order is scheduler, then handler. The scheduler lock is never taken
//! while the handler lock is held and is released before calling into the
//! handler.

use std::sync::{Arc, Weak};

use duplex_core::{
    CoreError, EventHandler, HostFunction, HostValue, ObjectId, PropertyKind, PropertyRef,
    PropertyValue, Result,
};
use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::animation::{AnimParams, Animation, Step};

new_key_type! {
    /// Handle to a registered animation
    pub struct AnimationId;
}

/// Host-facing handle: registry slot plus the managed object the host holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimHandle {
    pub id: AnimationId,
    pub object: ObjectId,
}

/// Registry entry
struct AnimEntry {
    object: ObjectId,
    target: PropertyRef,
    kind: PropertyKind,
    /// `None` until started
    state: Option<Animation>,
    then: Option<HostFunction>,
}

/// Internal state of the animation scheduler
struct SchedulerInner {
    animations: SlotMap<AnimationId, AnimEntry>,
}

/// A value computed during a tick, written after the registry lock is dropped
struct PendingWrite {
    anim: AnimHandle,
    target: PropertyRef,
    kind: PropertyKind,
    step: Step,
    then: Option<HostFunction>,
}

/// The animation scheduler that ticks all registered animations
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct AnimationScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    handler: EventHandler,
}

impl AnimationScheduler {
    pub fn new(handler: EventHandler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                animations: SlotMap::with_key(),
            })),
            handler,
        }
    }

    /// Weak handle for deferred callbacks
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Arc::downgrade(&self.inner),
            handler: self.handler.clone(),
        }
    }

    pub fn handler(&self) -> &EventHandler {
        &self.handler
    }

    /// Bind a new animation to a numeric property (control thread).
    ///
    /// The property's owner stays retained until the animation is stopped.
    pub fn create(&self, target: PropertyRef) -> Result<AnimHandle> {
        let kind = self.handler.property_kind(target)?;
        if !kind.is_numeric() {
            return Err(CoreError::type_error("property cannot be animated"));
        }
        if !self.handler.retain(target.object) {
            return Err(CoreError::UnknownObject);
        }
        let object = self.handler.create_basic_object("Anim");
        // Registry reference, dropped by stop()
        self.handler.retain(object);

        let id = self.inner.lock().animations.insert(AnimEntry {
            object,
            target,
            kind,
            state: None,
            then: None,
        });
        tracing::debug!("animation {:?} bound to {:?}/{}", id, target.object, target.id);
        Ok(AnimHandle { id, object })
    }

    /// Start an animation. Fails with a type error if it already started.
    pub fn start(&self, anim: AnimHandle, params: AnimParams, then: Option<HostFunction>) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .animations
            .get_mut(anim.id)
            .ok_or(CoreError::UnknownObject)?;
        if entry.state.is_some() {
            return Err(CoreError::type_error("already started"));
        }
        tracing::debug!(
            "start {:?}: {} -> {} over {}ms ({:?}, {})",
            anim.id,
            params.from,
            params.to,
            params.duration,
            params.repeat,
            params.timing.name()
        );
        entry.state = Some(Animation::new(params));
        entry.then = then;
        Ok(())
    }

    /// Start from a host parameter dictionary (see [`AnimParams::from_host`]).
    /// A `then` function in the dictionary is called once the animation ends.
    pub fn start_from_host(&self, anim: AnimHandle, params: &HostValue) -> Result<()> {
        if self.is_started(anim) {
            return Err(CoreError::type_error("already started"));
        }
        let then = params.get("then").and_then(HostValue::as_function).cloned();
        self.start(anim, AnimParams::from_host(params)?, then)
    }

    pub fn is_started(&self, anim: AnimHandle) -> bool {
        self.inner
            .lock()
            .animations
            .get(anim.id)
            .is_some_and(|entry| entry.state.is_some())
    }

    /// Whether the animation is registered and has not ended
    pub fn is_running(&self, anim: AnimHandle) -> bool {
        self.inner
            .lock()
            .animations
            .get(anim.id)
            .and_then(|entry| entry.state.as_ref())
            .is_some_and(|state| !state.is_ended())
    }

    /// Number of registered animations
    pub fn count(&self) -> usize {
        self.inner.lock().animations.len()
    }

    /// Stop and destroy an animation (control thread). Idempotent.
    pub fn stop(&self, anim: AnimHandle) {
        stop_animation(&self.inner, &self.handler, anim);
    }

    /// Stop every registered animation.
    pub fn clear(&self) {
        let handles: Vec<AnimHandle> = self
            .inner
            .lock()
            .animations
            .iter()
            .map(|(id, entry)| AnimHandle {
                id,
                object: entry.object,
            })
            .collect();
        if !handles.is_empty() {
            tracing::debug!("clearing {} animations", handles.len());
        }
        for anim in handles {
            self.stop(anim);
        }
    }

    /// Advance every running animation to `now` (render thread).
    ///
    /// Returns true while any animation is still running.
    pub fn tick(&self, now: f64) -> bool {
        let mut writes: SmallVec<[PendingWrite; 8]> = SmallVec::new();
        let active = {
            let mut inner = self.inner.lock();
            for (id, entry) in inner.animations.iter_mut() {
                let Some(state) = entry.state.as_mut() else {
                    continue;
                };
                let step = state.update(now);
                if step == Step::Idle {
                    continue;
                }
                let then = match step {
                    Step::Ended(_) => entry.then.take(),
                    _ => None,
                };
                writes.push(PendingWrite {
                    anim: AnimHandle {
                        id,
                        object: entry.object,
                    },
                    target: entry.target,
                    kind: entry.kind,
                    step,
                    then,
                });
            }
            inner
                .animations
                .values()
                .any(|entry| entry.state.as_ref().is_some_and(|s| !s.is_ended()))
        };

        for write in writes {
            let (Step::Value(v) | Step::Ended(v)) = write.step else {
                continue;
            };
            if let Some(value) = PropertyValue::from_f64(write.kind, v) {
                if let Err(err) = self.handler.set_value(write.target, value) {
                    tracing::debug!("animation {:?} write failed: {}", write.anim.id, err);
                }
            }
            if matches!(write.step, Step::Ended(_)) {
                self.end(write.anim, write.then);
            }
        }
        active
    }

    /// Queue the host-side end of an animation: `then()`, then `stop()`.
    fn end(&self, anim: AnimHandle, then: Option<HostFunction>) {
        tracing::debug!("animation {:?} ended", anim.id);
        if let Some(then) = then {
            self.handler.enqueue_js_callback(
                Some(anim.object),
                Some(Box::new(move |_: &EventHandler| {
                    then.call(&[]);
                })),
                None,
            );
        }
        let handle = self.handle();
        self.handler.enqueue_js_callback(
            Some(anim.object),
            Some(Box::new(move |_: &EventHandler| handle.stop(anim))),
            None,
        );
    }
}

fn stop_animation(inner: &Mutex<SchedulerInner>, handler: &EventHandler, anim: AnimHandle) {
    // Keep the object alive while it is torn down.
    if !handler.retain(anim.object) {
        return;
    }
    let removed = inner.lock().animations.remove(anim.id);
    if let Some(entry) = removed {
        handler.release(entry.object);
        handler.destroy_object(entry.object);
        handler.release(entry.target.object);
        tracing::debug!("animation {:?} stopped", anim.id);
    }
    handler.release(anim.object);
}

/// A weak handle to the animation scheduler
///
/// Used by deferred callbacks. It won't keep the registry alive; operations
/// on a dropped scheduler are no-ops.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Weak<Mutex<SchedulerInner>>,
    handler: EventHandler,
}

impl SchedulerHandle {
    pub fn stop(&self, anim: AnimHandle) {
        if let Some(inner) = self.inner.upgrade() {
            stop_animation(&inner, &self.handler, anim);
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimingFunction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (EventHandler, AnimationScheduler, ObjectId, PropertyRef) {
        let handler = EventHandler::new();
        let scheduler = AnimationScheduler::new(handler.clone());
        let rect = handler.create_basic_object("Rect");
        let id = handler
            .register_property(rect, "x", PropertyKind::Float, Some(&HostValue::Number(0.0)))
            .unwrap();
        (handler, scheduler, rect, PropertyRef::new(rect, id))
    }

    #[test]
    fn test_tick_writes_property() {
        let (handler, scheduler, _, x) = setup();
        let anim = scheduler.create(x).unwrap();
        scheduler
            .start(anim, AnimParams::new(0.0, 10.0, 1000.0), None)
            .unwrap();
        assert!(scheduler.is_running(anim));

        assert!(scheduler.tick(1000.0));
        assert!(scheduler.tick(1500.0));
        assert_eq!(handler.value(x).unwrap(), PropertyValue::Float(5.0));
        assert_eq!(handler.host_value(x), Some(HostValue::Number(5.0)));
    }

    #[test]
    fn test_end_runs_then_and_stop_on_control_tick() {
        let (handler, scheduler, rect, x) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let then = HostFunction::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            HostValue::Undefined
        });

        let anim = scheduler.create(x).unwrap();
        assert_eq!(handler.ref_count(rect), Some(2));
        scheduler
            .start(anim, AnimParams::new(0.0, 10.0, 1000.0), Some(then))
            .unwrap();
        scheduler.tick(0.0);
        assert!(!scheduler.tick(1000.0));
        assert_eq!(handler.value(x).unwrap(), PropertyValue::Float(10.0));
        assert!(!scheduler.is_running(anim));

        // Ended, but callbacks wait for the control thread.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.count(), 1);

        handler.process_control_tick();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.count(), 0);
        assert_eq!(handler.ref_count(rect), Some(1));
        assert!(handler.is_object_destroyed(anim.object));

        // Host drops its handle.
        handler.release(anim.object);
        assert!(!handler.contains(anim.object));
    }

    #[test]
    fn test_double_start_is_type_error() {
        let (_, scheduler, _, x) = setup();
        let anim = scheduler.create(x).unwrap();
        scheduler.start(anim, AnimParams::default(), None).unwrap();
        assert_eq!(
            scheduler.start(anim, AnimParams::default(), None),
            Err(CoreError::Type("already started".into()))
        );
        let params = HostValue::dict([("to", HostValue::Number(3.0))]);
        assert_eq!(
            scheduler.start_from_host(anim, &params),
            Err(CoreError::Type("already started".into()))
        );
    }

    #[test]
    fn test_non_numeric_property_rejected() {
        let (handler, scheduler, rect, _) = setup();
        let id = handler
            .register_property(rect, "title", PropertyKind::Utf8, None)
            .unwrap();
        assert_eq!(
            scheduler.create(PropertyRef::new(rect, id)),
            Err(CoreError::Type("property cannot be animated".into()))
        );
        assert_eq!(handler.ref_count(rect), Some(1));
    }

    #[test]
    fn test_integer_property_animates() {
        let (handler, scheduler, rect, _) = setup();
        let id = handler
            .register_property(rect, "frame", PropertyKind::Int32, None)
            .unwrap();
        let frame = PropertyRef::new(rect, id);
        let anim = scheduler.create(frame).unwrap();
        scheduler
            .start(anim, AnimParams::new(0.0, 8.0, 800.0), None)
            .unwrap();
        scheduler.tick(0.0);
        scheduler.tick(350.0);
        assert_eq!(handler.value(frame).unwrap(), PropertyValue::Int32(3));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (handler, scheduler, rect, x) = setup();
        let anim = scheduler.create(x).unwrap();
        scheduler.start(anim, AnimParams::default(), None).unwrap();
        scheduler.stop(anim);
        scheduler.stop(anim);
        assert_eq!(scheduler.count(), 0);
        assert_eq!(handler.ref_count(rect), Some(1));
        assert_eq!(handler.ref_count(anim.object), Some(1));
        assert!(handler.is_object_destroyed(anim.object));

        // Stop queued by an end after an explicit stop is harmless.
        scheduler.handle().stop(anim);
        assert_eq!(handler.ref_count(anim.object), Some(1));
    }

    #[test]
    fn test_start_from_host_dictionary() {
        let (handler, scheduler, _, x) = setup();
        let anim = scheduler.create(x).unwrap();
        let params = HostValue::dict([
            ("from", HostValue::Number(0.0)),
            ("to", HostValue::Number(100.0)),
            ("duration", HostValue::Number(1000.0)),
            ("count", HostValue::Number(-1.0)),
            ("timeFunc", HostValue::from("cubicIn")),
        ]);
        scheduler.start_from_host(anim, &params).unwrap();
        scheduler.tick(0.0);
        scheduler.tick(500.0);
        assert_eq!(
            handler.value(x).unwrap(),
            PropertyValue::Float((100.0 * TimingFunction::CubicIn.apply(0.5)) as f32)
        );
        // Forever: still running after many cycles.
        assert!(scheduler.tick(10_250.0));
    }

    #[test]
    fn test_clear_stops_everything() {
        let (handler, scheduler, rect, x) = setup();
        for _ in 0..3 {
            let anim = scheduler.create(x).unwrap();
            scheduler.start(anim, AnimParams::default().forever(), None).unwrap();
        }
        assert_eq!(handler.ref_count(rect), Some(4));
        scheduler.clear();
        assert_eq!(scheduler.count(), 0);
        assert_eq!(handler.ref_count(rect), Some(1));
        assert!(!scheduler.tick(0.0));
    }

    #[test]
    fn test_handle_outlives_scheduler() {
        let (handler, scheduler, _, x) = setup();
        let anim = scheduler.create(x).unwrap();
        let handle = scheduler.handle();
        assert!(handle.is_alive());
        drop(scheduler);
        assert!(!handle.is_alive());
        handle.stop(anim);
        assert!(!handler.is_object_destroyed(anim.object));
    }
}
