//! Renderer Configuration
//!
//! Tunables for the cooperative work loop and the post-commit effect phase.
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```json
//! { "slice_budget_ms": 4, "effect_order": "fifo" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Order in which effect hooks queued during a pass run after its commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectOrder {
    /// Last queued runs first. Effects are queued parent-before-child during
    /// render, so children's effects run before their parents'.
    #[default]
    Lifo,
    /// Effects run in the order their components rendered.
    Fifo,
}

/// Configuration for a mounted root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Length of one idle slice used by the built-in drivers, in milliseconds.
    pub slice_budget_ms: u64,

    /// The work loop yields once less than this much time remains in a slice.
    pub yield_threshold_ms: f64,

    /// Drain order for effect hooks.
    pub effect_order: EffectOrder,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            slice_budget_ms: 8,
            yield_threshold_ms: 1.0,
            effect_order: EffectOrder::Lifo,
        }
    }
}

impl RendererConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the slice budget leaves room to do work before yielding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slice_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "slice_budget_ms must be greater than zero".into(),
            ));
        }
        if !self.yield_threshold_ms.is_finite() || self.yield_threshold_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "yield_threshold_ms must be a non-negative number, got {}",
                self.yield_threshold_ms
            )));
        }
        if self.yield_threshold_ms >= self.slice_budget_ms as f64 {
            return Err(ConfigError::Invalid(format!(
                "yield_threshold_ms ({}) must be below slice_budget_ms ({})",
                self.yield_threshold_ms, self.slice_budget_ms
            )));
        }
        Ok(())
    }

    pub fn slice_budget(&self) -> Duration {
        Duration::from_millis(self.slice_budget_ms)
    }

    pub fn yield_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.yield_threshold_ms / 1000.0)
    }
}
