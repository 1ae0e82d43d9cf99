use thiserror::Error;

use crate::{
    decoder::{DecodeError, decode_argmax},
    window_extractor::WindowTensor,
};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to load model '{model}': {reason}")]
    Load { model: String, reason: String },

    #[error("Forward pass failed: {0}")]
    Run(String),
}

impl InferenceError {
    pub fn load(model: &str, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn run(reason: impl std::fmt::Display) -> Self {
        Self::Run(reason.to_string())
    }
}

/// Raw model output for one window: flat scores plus their logical shape,
/// `(batch, classes, ...spatial)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScoreBlock {
    data: Vec<f32>,
    dims: Vec<usize>,
}

impl ClassScoreBlock {
    pub fn new(data: Vec<f32>, dims: Vec<usize>) -> Self {
        Self { data, dims }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn num_classes(&self) -> Option<usize> {
        self.dims.get(1).copied()
    }

    pub fn spatial_size(&self) -> usize {
        self.dims.iter().skip(2).product()
    }

    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        decode_argmax(&self.data, &self.dims)
    }
}

/// A loaded model that can score one window at a time.
///
/// A session is created once per run and reused for every window, one call
/// at a time.
#[allow(async_fn_in_trait)]
pub trait InferenceSession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError>;
}

/// Creates [`InferenceSession`]s from a model identifier (usually a path).
#[allow(async_fn_in_trait)]
pub trait ModelRuntime {
    type Session: InferenceSession;

    async fn load(&self, model: &str) -> Result<Self::Session, InferenceError>;
}
