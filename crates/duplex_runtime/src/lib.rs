//! Duplex Runtime
//!
//! Runs the two-thread model on top of `duplex_core` and `duplex_animation`:
//! a named render thread drains the render queue and advances animations every
//! frame, while the owning (control) thread runs [`Runtime::control_tick`]
//! to destruct drained records and deliver host effects.
//!
//! # Example
//!
//! ```no_run
//! use duplex_runtime::{NullRenderer, Runtime, RuntimeConfig};
//!
//! duplex_runtime::logging::init_from_config(&RuntimeConfig::debug());
//! let mut runtime = Runtime::new(RuntimeConfig::debug());
//! runtime.start(NullRenderer)?;
//! loop {
//!     runtime.control_tick();
//!     # break;
//! }
//! runtime.shutdown();
//! # Ok::<(), duplex_runtime::RuntimeError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod render_loop;
pub mod runtime;

pub use clock::FrameClock;
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use render_loop::{FrameInfo, FrameRenderer, NullRenderer, RenderLoop};
pub use runtime::Runtime;
