//! Duplex Core
//!
//! Cross-thread property synchronization between a dynamically-typed
//! scripting host (the control thread) and a render thread:
//!
//! - **Host Values**: the dynamic values the host hands over
//! - **Typed Properties**: a closed set of native kinds with explicit decode
//! - **Managed Objects**: reference-counted entities in a generation-checked arena
//! - **Update Records**: one mutation or notification in flight
//! - **Event Handler**: the render, free and control queues plus their mutex
//!
//! # Example
//!
//! ```rust
//! use duplex_core::{EventHandler, HostValue, PropertyKind, PropertyRef, PropertyValue};
//!
//! let handler = EventHandler::new();
//! let rect = handler.create_basic_object("Rect");
//! let id = handler
//!     .register_property(rect, "x", PropertyKind::Float, Some(&HostValue::Number(0.0)))
//!     .unwrap();
//!
//! // Host write: decoded now, applied on the next render tick
//! assert!(handler.enqueue_property_update(rect, id, &HostValue::Number(12.0)));
//! handler.process_render_queue();
//! assert_eq!(
//!     handler.value(PropertyRef::new(rect, id)).unwrap(),
//!     PropertyValue::Float(12.0)
//! );
//!
//! // Drained records are destructed on the control thread
//! handler.process_control_tick();
//! ```

pub mod error;
pub mod handler;
pub mod host;
pub mod object;
pub mod property;
pub mod update;

pub use error::{CoreError, Result};
pub use handler::{EventHandler, HandlerOptions, HandlerStats, HostListener, WakeCallback};
pub use host::{HostFunction, HostValue};
pub use object::{BasicBehavior, ManagedObject, ObjectBehavior, ObjectId};
pub use property::{Payload, Property, PropertyId, PropertyKind, PropertyRef, PropertyValue};
pub use update::{
    HostCallback, JsCallbackUpdate, JsPropertyUpdate, Phase, PropertyUpdate, UpdateRecord,
    ValueCallback, ValueTarget, ValueUpdate,
};
