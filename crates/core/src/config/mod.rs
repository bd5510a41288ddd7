use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::gl::DrawMode;
use crate::input::{default_bindings, Intent};
use crate::mapping::{default_descriptors, MappingDescriptor};
use crate::queue::QueueConfig;
use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub queue: QueueConfig,
    pub render: RenderConfig,
    pub mappings: Vec<MappingDescriptor>,
    /// Key name → intent.
    pub bindings: BTreeMap<String, Intent>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mappings = default_descriptors();
        let queue = QueueConfig {
            coalescing: mappings.iter().map(|mapping| mapping.target.clone()).collect(),
        };
        Self {
            audio: AudioConfig::default(),
            queue,
            render: RenderConfig::default(),
            mappings,
            bindings: default_bindings(),
        }
    }
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON config. Missing sections fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
        }
    }
}

/// Frame loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Draw mode of the fullscreen quad.
    pub draw_mode: DrawMode,
    pub frame_interval_ms: u64,
    pub blend: bool,
    pub depth_test: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            draw_mode: DrawMode::Triangles,
            frame_interval_ms: 16,
            blend: true,
            depth_test: false,
        }
    }
}
