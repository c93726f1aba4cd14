//! Duplex Animation System
//!
//! Time-based interpolation of numeric properties, advanced once per render
//! frame.
//!
//! # Features
//!
//! - **Timing Functions**: linear and cubic in/out/in-out curves
//! - **Repeat & Autoreverse**: finite or endless cycles, optionally mirrored
//! - **Phase Locking**: animations sharing a reference time stay in step
//! - **Deferred Completion**: `then` callbacks and `stop()` run on the control thread

pub mod animation;
pub mod scheduler;
pub mod timing;

pub use animation::{AnimParams, Animation, Direction, Repeat, Step};
pub use scheduler::{AnimHandle, AnimationId, AnimationScheduler, SchedulerHandle};
pub use timing::TimingFunction;
