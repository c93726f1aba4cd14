//! Runtime configuration presets.
//!
//! Loadable from TOML; every field is optional in the file and falls back to
//! the [`RuntimeConfig::standard`] value.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a runtime instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Render loop pacing (frames per second).
    pub target_fps: u32,
    /// Name given to the render thread.
    pub render_thread_name: String,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Render queue depth past which a warning is logged.
    pub queue_warn_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuntimeConfig {
    /// Standard configuration for general use.
    pub fn standard() -> Self {
        Self {
            target_fps: 60,
            render_thread_name: "duplex-render".to_string(),
            log_filter: "info".to_string(),
            queue_warn_depth: 4096,
        }
    }

    /// Debug configuration with verbose logging and an early queue warning.
    pub fn debug() -> Self {
        Self {
            target_fps: 60,
            render_thread_name: "duplex-render".to_string(),
            log_filter: "debug".to_string(),
            queue_warn_depth: 256,
        }
    }

    /// Testing configuration: fast frames, quiet logs.
    pub fn testing() -> Self {
        Self {
            target_fps: 500,
            render_thread_name: "duplex-render-test".to_string(),
            log_filter: "warn".to_string(),
            queue_warn_depth: 4096,
        }
    }

    /// Set the frame rate.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the render thread name.
    pub fn with_render_thread_name(mut self, name: impl Into<String>) -> Self {
        self.render_thread_name = name.into();
        self
    }

    /// Set the fallback log filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the render queue warning depth.
    pub fn with_queue_warn_depth(mut self, depth: usize) -> Self {
        self.queue_warn_depth = depth;
        self
    }

    /// Time budget of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.target_fps.max(1)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            bail!("target_fps must be greater than zero");
        }
        if self.render_thread_name.is_empty() {
            bail!("render_thread_name must not be empty");
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(content).context("Failed to parse runtime configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize runtime configuration")
    }
}
