use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Hand-off messages drained per `update_contents` tick.
    #[serde(default = "PipelineConfig::default_publish_budget")]
    pub publish_budget: usize,
    #[serde(default = "PipelineConfig::default_handoff_depth")]
    pub handoff_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolbarConfig {
    #[serde(default = "ToolbarConfig::default_alpha")]
    pub default_alpha: f32,
    #[serde(default = "ToolbarConfig::default_highlight_alpha")]
    pub highlight_alpha: f32,
    #[serde(default = "ToolbarConfig::default_rotate_key")]
    pub rotate_key: char,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "WatchConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "WatchConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub toolbar: ToolbarConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogConfigOverrides {
    pub undo_capacity: Option<usize>,
    pub publish_budget: Option<usize>,
    pub watch: Option<bool>,
}

impl HistoryConfig {
    const fn default_capacity() -> usize {
        50
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: Self::default_capacity() }
    }
}

impl PipelineConfig {
    const fn default_publish_budget() -> usize {
        1
    }

    const fn default_handoff_depth() -> usize {
        64
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { publish_budget: Self::default_publish_budget(), handoff_depth: Self::default_handoff_depth() }
    }
}

impl ToolbarConfig {
    fn default_alpha() -> f32 {
        0.75
    }

    fn default_highlight_alpha() -> f32 {
        1.0
    }

    const fn default_rotate_key() -> char {
        'r'
    }
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            default_alpha: Self::default_alpha(),
            highlight_alpha: Self::default_highlight_alpha(),
            rotate_key: Self::default_rotate_key(),
        }
    }
}

impl WatchConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_poll_interval_ms() -> u64 {
        250
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: Self::default_enabled(), poll_interval_ms: Self::default_poll_interval_ms() }
    }
}

impl CatalogConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &CatalogConfigOverrides) {
        if let Some(capacity) = overrides.undo_capacity {
            self.history.capacity = capacity;
        }
        if let Some(budget) = overrides.publish_budget {
            self.pipeline.publish_budget = budget;
        }
        if let Some(watch) = overrides.watch {
            self.watch.enabled = watch;
        }
    }
}

impl CatalogConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.undo_capacity.is_none() && self.publish_budget.is_none() && self.watch.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.undo_capacity.is_some() {
            fields.push("undo_capacity");
        }
        if self.publish_budget.is_some() {
            fields.push("publish_budget");
        }
        if self.watch.is_some() {
            fields.push("watch");
        }
        fields
    }
}
