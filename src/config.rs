use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{enums::EdgeCoverage, volume::Shape, window_planner::WindowPlanner};

pub const DEFAULT_MODEL: &str = "grace.onnx";
pub const DEFAULT_CROP_SIZE: usize = 64;
pub const DEFAULT_STEP_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Crop size must be positive")]
    ZeroCropSize,

    #[error("Step size must be positive")]
    ZeroStepSize,

    #[error("Retry policy must allow at least one attempt")]
    ZeroAttempts,
}

/// How often a failing forward pass is attempted for the same window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per window, including the first. `1` disables retry.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

/// Settings for one sliding-window segmentation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Identifier handed to [`ModelRuntime::load`](crate::inference::ModelRuntime::load).
    pub model: String,
    /// Edge length of the cubic window.
    pub crop_size: usize,
    /// Distance between neighbouring window origins along every axis.
    pub step_size: usize,
    pub edge_coverage: EdgeCoverage,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            crop_size: DEFAULT_CROP_SIZE,
            step_size: DEFAULT_STEP_SIZE,
            edge_coverage: EdgeCoverage::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_window(mut self, crop_size: usize, step_size: usize) -> Self {
        self.crop_size = crop_size;
        self.step_size = step_size;
        self
    }

    pub fn with_edge_coverage(mut self, edge_coverage: EdgeCoverage) -> Self {
        self.edge_coverage = edge_coverage;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crop_size == 0 {
            return Err(ConfigError::ZeroCropSize);
        }
        if self.step_size == 0 {
            return Err(ConfigError::ZeroStepSize);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    pub fn crop_dims(&self) -> Shape {
        Shape::cube(self.crop_size)
    }

    pub fn planner(&self) -> Result<WindowPlanner, ConfigError> {
        WindowPlanner::new(self.crop_size, self.step_size, self.edge_coverage)
    }
}
