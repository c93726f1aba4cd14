//! Runtime
//!
//! Ties the event handler, the animation scheduler and the render thread
//! together. The thread that creates the [`Runtime`] is the control thread:
//! it calls [`Runtime::control_tick`] whenever the wake callback fires (or on
//! every turn of its event loop).

use std::path::Path;

use duplex_animation::AnimationScheduler;
use duplex_core::{EventHandler, HandlerOptions, WakeCallback};

use crate::clock::FrameClock;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::render_loop::{FrameRenderer, RenderLoop};

pub struct Runtime {
    config: RuntimeConfig,
    handler: EventHandler,
    scheduler: AnimationScheduler,
    clock: FrameClock,
    render_loop: Option<RenderLoop>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_options(config, HandlerOptions::default())
    }

    /// Create a runtime whose render thread wakes the control thread
    /// through `wake`.
    pub fn with_wake(config: RuntimeConfig, wake: WakeCallback) -> Self {
        Self::with_options(config, HandlerOptions::default().with_wake(wake))
    }

    pub fn with_options(config: RuntimeConfig, options: HandlerOptions) -> Self {
        let handler =
            EventHandler::with_options(options.with_queue_warn_depth(config.queue_warn_depth));
        let scheduler = AnimationScheduler::new(handler.clone());
        Self {
            config,
            handler,
            scheduler,
            clock: FrameClock::new(),
            render_loop: None,
        }
    }

    /// Create a runtime from a TOML config file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config =
            RuntimeConfig::load(path).map_err(|err| RuntimeError::Config(format!("{:#}", err)))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn handler(&self) -> &EventHandler {
        &self.handler
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    /// Current frame clock time in milliseconds
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Spawn the render thread.
    pub fn start<R: FrameRenderer>(&mut self, renderer: R) -> Result<()> {
        if self.render_loop.is_some() {
            return Err(RuntimeError::AlreadyRunning);
        }
        if self.handler.is_destroyed() {
            return Err(duplex_core::CoreError::HandlerDestroyed.into());
        }
        self.render_loop = Some(RenderLoop::spawn(
            &self.config,
            self.handler.clone(),
            self.scheduler.clone(),
            self.clock,
            renderer,
        )?);
        tracing::debug!("runtime started at {} fps", self.config.target_fps);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_some()
    }

    /// Frames rendered by the current render thread
    pub fn frames(&self) -> u64 {
        self.render_loop.as_ref().map_or(0, RenderLoop::frames)
    }

    /// Control-thread tick: destruct drained records and run host effects.
    pub fn control_tick(&self) -> usize {
        self.handler.process_control_tick()
    }

    /// Stop and join the render thread. Queued records stay queued.
    pub fn stop_rendering(&mut self) -> Result<()> {
        let mut render_loop = self.render_loop.take().ok_or(RuntimeError::NotRunning)?;
        render_loop.stop();
        Ok(())
    }

    /// Stop rendering, stop every animation and tear the handler down.
    pub fn shutdown(&mut self) {
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
        if self.handler.is_destroyed() {
            return;
        }
        self.scheduler.clear();
        self.handler.destroy();
        tracing::debug!("runtime shut down: {:?}", self.handler.stats());
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.handler.is_control_thread() {
            self.shutdown();
        } else if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
    }
}
