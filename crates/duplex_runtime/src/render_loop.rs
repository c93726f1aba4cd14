//! Render thread
//!
//! One engine tick per frame: drain the render queue (APPLY phases), advance
//! animations, then hand the frame to the [`FrameRenderer`]. Drained records
//! go back to the control thread through the free queue; the handler's wake
//! callback tells the control thread to run its tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use duplex_animation::AnimationScheduler;
use duplex_core::EventHandler;

use crate::clock::FrameClock;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};

/// Per-frame information passed to the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Frame counter, starting at 0
    pub index: u64,
    /// Clock time the animations were advanced to
    pub time_ms: f64,
    /// Records applied from the render queue this frame
    pub applied: usize,
    /// Whether any animation is still running
    pub animating: bool,
}

/// Draws a frame on the render thread
pub trait FrameRenderer: Send + 'static {
    fn render(&mut self, handler: &EventHandler, frame: &FrameInfo);
}

impl<F> FrameRenderer for F
where
    F: FnMut(&EventHandler, &FrameInfo) + Send + 'static,
{
    fn render(&mut self, handler: &EventHandler, frame: &FrameInfo) {
        self(handler, frame)
    }
}

/// Renderer that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl FrameRenderer for NullRenderer {
    fn render(&mut self, _handler: &EventHandler, _frame: &FrameInfo) {}
}

/// Handle to a running render thread
pub struct RenderLoop {
    /// Stop signal for the render thread
    stop_flag: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Spawn the render thread.
    pub fn spawn<R: FrameRenderer>(
        config: &RuntimeConfig,
        handler: EventHandler,
        scheduler: AnimationScheduler,
        clock: FrameClock,
        mut renderer: R,
    ) -> Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let frame_duration = config.frame_duration();

        let thread_stop = Arc::clone(&stop_flag);
        let thread_frames = Arc::clone(&frames);
        let thread_handle = thread::Builder::new()
            .name(config.render_thread_name.clone())
            .spawn(move || {
                tracing::debug!("render thread started ({:?} per frame)", frame_duration);
                while !thread_stop.load(Ordering::Relaxed) {
                    let start = Instant::now();

                    let applied = handler.process_render_queue();
                    let time_ms = clock.now_ms();
                    let animating = scheduler.tick(time_ms);
                    let frame = FrameInfo {
                        index: thread_frames.load(Ordering::Relaxed),
                        time_ms,
                        applied,
                        animating,
                    };
                    renderer.render(&handler, &frame);
                    thread_frames.fetch_add(1, Ordering::Relaxed);

                    // Sleep for remaining frame time
                    let elapsed = start.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    }
                }
                tracing::debug!("render thread stopped");
            })
            .map_err(|err| RuntimeError::ThreadSpawn(err.to_string()))?;

        Ok(Self {
            stop_flag,
            frames,
            thread_handle: Some(thread_handle),
        })
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Signal the thread and wait for the frame in flight to finish.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("render thread panicked");
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::{HostValue, PropertyKind, PropertyRef, PropertyValue};
    use std::sync::Mutex;
    use std::time::Duration;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_render_thread_applies_queued_writes() {
        let handler = EventHandler::new();
        let scheduler = AnimationScheduler::new(handler.clone());
        let rect = handler.create_basic_object("Rect");
        let id = handler
            .register_property(rect, "x", PropertyKind::Float, Some(&HostValue::Number(0.0)))
            .unwrap();
        let x = PropertyRef::new(rect, id);

        let applied = Arc::new(AtomicU64::new(0));
        let counter = applied.clone();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let names = threads.clone();
        let mut render = RenderLoop::spawn(
            &RuntimeConfig::testing(),
            handler.clone(),
            scheduler,
            FrameClock::new(),
            move |_: &EventHandler, frame: &FrameInfo| {
                counter.fetch_add(frame.applied as u64, Ordering::SeqCst);
                if frame.index == 0 {
                    let name = thread::current().name().map(str::to_string);
                    names.lock().unwrap().push(name);
                }
            },
        )
        .unwrap();

        for i in 1..=3i32 {
            assert!(handler.enqueue_property_update(rect, id, &HostValue::from(i)));
        }
        assert!(wait_until(|| applied.load(Ordering::SeqCst) == 3));
        assert_eq!(handler.value(x).unwrap(), PropertyValue::Float(3.0));

        render.stop();
        assert!(!render.is_running());
        assert!(render.frames() > 0);
        assert_eq!(
            threads.lock().unwrap().first().cloned().flatten().as_deref(),
            Some("duplex-render-test")
        );

        handler.process_control_tick();
        assert_eq!(handler.stats().deletes, 3);
        assert_eq!(handler.ref_count(rect), Some(1));
    }
}
