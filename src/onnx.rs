//! ONNX Runtime backed [`ModelRuntime`], enabled with the `onnx` feature.

use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use tracing::{debug, info};

use crate::{
    inference::{ClassScoreBlock, InferenceError, InferenceSession, ModelRuntime},
    window_extractor::WindowTensor,
};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub optimization_level: GraphOptimizationLevel,
    /// Intra-op thread count; `None` leaves the runtime default.
    pub intra_threads: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            optimization_level: GraphOptimizationLevel::Level3,
            intra_threads: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxRuntime {
    options: SessionOptions,
}

impl OnnxRuntime {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

impl ModelRuntime for OnnxRuntime {
    type Session = OnnxSession;

    async fn load(&self, model: &str) -> Result<OnnxSession, InferenceError> {
        let mut builder = Session::builder()
            .map_err(|err| InferenceError::load(model, err))?
            .with_optimization_level(self.options.optimization_level)
            .map_err(|err| InferenceError::load(model, err))?;
        if let Some(threads) = self.options.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|err| InferenceError::load(model, err))?;
        }
        let session = builder
            .commit_from_file(model)
            .map_err(|err| InferenceError::load(model, err))?;

        // The first declared input and output are the image and the class
        // scores.
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| InferenceError::load(model, "model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| InferenceError::load(model, "model declares no outputs"))?;

        info!(model, input = %input_name, output = %output_name, "Loaded ONNX model");
        Ok(OnnxSession {
            session,
            input_name,
            output_name,
        })
    }
}

pub struct OnnxSession {
    session: Session,
    input_name: String,
    output_name: String,
}

impl InferenceSession for OnnxSession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError> {
        let input = Tensor::from_array(tensor.data().clone()).map_err(InferenceError::run)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input])
            .map_err(InferenceError::run)?;
        let scores = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(InferenceError::run)?;

        let dims = scores.shape().to_vec();
        debug!(?dims, "ONNX forward pass finished");
        Ok(ClassScoreBlock::new(scores.iter().copied().collect(), dims))
    }
}
