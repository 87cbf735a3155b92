//! Scoring models behind the embedder.
//!
//! A model takes one fixed-length sequence of token ids and returns its raw
//! output flattened to a single `Vec<f32>`. Pooling and normalization happen
//! in [`crate::embedder`].

use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::config::Number;
use crate::error::{Result, SemdexError};
use crate::tokenizer::PAD_ID;

pub trait ScoringModel: Send {
    /// Length every input sequence is padded or truncated to.
    fn input_length(&self) -> usize;

    fn infer(&mut self, input_ids: &[i64]) -> Result<Vec<Number>>;
}

/// Produces the single model handle an embedder owns.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn ScoringModel>>;
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loads an ONNX graph from disk with tract.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    path: PathBuf,
    input_length: usize,
}

impl OnnxModelLoader {
    pub fn new(path: impl Into<PathBuf>, input_length: usize) -> Self {
        Self {
            path: path.into(),
            input_length,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Box<dyn ScoringModel>> {
        Ok(Box::new(OnnxModel::load(&self.path, self.input_length)?))
    }
}

/// ONNX encoder taking `input_ids` and, when the graph declares them,
/// `attention_mask` and `token_type_ids`, each shaped `[1, input_length]`.
pub struct OnnxModel {
    plan: OnnxPlan,
    input_length: usize,
    input_count: usize,
}

impl OnnxModel {
    pub fn load(path: &Path, input_length: usize) -> Result<Self> {
        if !path.is_file() {
            return Err(SemdexError::ExternalFailure(format!(
                "model artifact not found at '{}'",
                path.display()
            )));
        }
        info!(path = %path.display(), input_length, "loading ONNX model");

        let load_failed = |e: anyhow::Error| load_error(path, e);

        let mut model = tract_onnx::onnx().model_for_path(path).map_err(load_failed)?;
        let input_count = model.inputs.len();
        if !(1..=3).contains(&input_count) {
            return Err(SemdexError::ExternalFailure(format!(
                "'{}' declares {input_count} inputs, expected 1 to 3",
                path.display()
            )));
        }
        for slot in 0..input_count {
            model = model
                .with_input_fact(slot, i64::fact([1, input_length]).into())
                .map_err(load_failed)?;
        }
        let plan = model
            .into_optimized()
            .map_err(load_failed)?
            .into_runnable()
            .map_err(load_failed)?;

        debug!(input_count, "ONNX model ready");
        Ok(Self {
            plan,
            input_length,
            input_count,
        })
    }

    fn input_tensor(&self, data: &[i64]) -> Result<TValue> {
        Tensor::from_shape(&[1, self.input_length], data)
            .map(TValue::from)
            .map_err(|e| SemdexError::ExternalFailure(format!("bad input shape: {e}")))
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> SemdexError {
    SemdexError::ExternalFailure(format!("failed to load '{}': {e}", path.display()))
}

impl ScoringModel for OnnxModel {
    fn input_length(&self) -> usize {
        self.input_length
    }

    fn infer(&mut self, input_ids: &[i64]) -> Result<Vec<Number>> {
        if input_ids.len() != self.input_length {
            return Err(SemdexError::InvalidArgument(format!(
                "expected {} token ids, got {}",
                self.input_length,
                input_ids.len()
            )));
        }

        let mut inputs: TVec<TValue> = tvec![self.input_tensor(input_ids)?];
        if self.input_count >= 2 {
            let mask: Vec<i64> = input_ids
                .iter()
                .map(|&id| i64::from(id != PAD_ID))
                .collect();
            inputs.push(self.input_tensor(&mask)?);
        }
        if self.input_count >= 3 {
            inputs.push(self.input_tensor(&vec![0; self.input_length])?);
        }

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| SemdexError::ExternalFailure(format!("inference failed: {e}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| SemdexError::ExternalFailure("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| SemdexError::ExternalFailure(format!("unexpected output type: {e}")))?;
        Ok(view.iter().copied().collect())
    }
}
