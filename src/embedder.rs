//! Text to vector.
//!
//! Tokenizes, runs the owned scoring model, mean-pools token output and
//! L2-normalizes the result.

use ndarray::{Array2, Axis};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::{Number, Settings};
use crate::error::{Result, SemdexError};
use crate::model::{ModelLoader, OnnxModelLoader, ScoringModel};
use crate::progress::{fraction, ProgressSink};
use crate::tokenizer::{HashTokenizer, TokenizerScheme};
use crate::vector_ops::normalize_vector;

/// Turns text into L2-normalized vectors of a fixed dimension.
///
/// Owns exactly one model handle. The handle is loaded on first use while
/// holding the embedder's lock, so concurrent first callers wait for a single
/// load, and later inference calls are serialized on the same lock.
pub struct Embedder {
    loader: Box<dyn ModelLoader>,
    tokenizer: HashTokenizer,
    dimension: usize,
    model: Mutex<Option<Box<dyn ScoringModel>>>,
}

impl Embedder {
    pub fn new(loader: impl ModelLoader + 'static, tokenizer: HashTokenizer, dimension: usize) -> Self {
        Self {
            loader: Box::new(loader),
            tokenizer,
            dimension,
            model: Mutex::new(None),
        }
    }

    /// Embedder over the ONNX model named by `settings.model_path`.
    ///
    /// The model file is not touched until the first embedding is requested.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let loader = OnnxModelLoader::new(settings.model_path()?, settings.max_length);
        let tokenizer = HashTokenizer::new(settings.tokenizer, settings.vocab_size);
        Ok(Self::new(loader, tokenizer, settings.dimension))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn scheme(&self) -> TokenizerScheme {
        self.tokenizer.scheme()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let raw = self.with_model(|model| {
            let ids = self.tokenizer.encode(text, model.input_length());
            model.infer(&ids)
        })?;
        let mut vector = pool(raw, self.dimension)?;
        normalize_vector(&mut vector);
        Ok(vector)
    }

    /// Embeds `texts` one after another, reporting after each item.
    pub fn embed_batch(&self, texts: &[String], progress: &dyn ProgressSink) -> Result<Vec<Vec<Number>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            vectors.push(self.embed(text)?);
            progress.report(fraction(i + 1, texts.len()));
        }
        Ok(vectors)
    }

    /// Releases the model handle.
    ///
    /// Embedding after `close` is not supported.
    pub fn close(&self) {
        if let Ok(mut guard) = self.lock() {
            if guard.take().is_some() {
                info!("embedding model released");
            }
        }
    }

    fn with_model<T>(&self, run: impl FnOnce(&mut dyn ScoringModel) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let model = match guard.take() {
            Some(model) => model,
            None => {
                let model = self
                    .loader
                    .load()
                    .map_err(|e| SemdexError::ModelLoad(e.to_string()))?;
                info!(
                    input_length = model.input_length(),
                    dimension = self.dimension,
                    tokenizer = %self.tokenizer.scheme(),
                    "embedding model loaded"
                );
                model
            }
        };
        let model = guard.insert(model);
        run(&mut **model)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Box<dyn ScoringModel>>>> {
        self.model
            .lock()
            .map_err(|_| SemdexError::ExternalFailure("embedding model lock poisoned".to_string()))
    }
}

/// Collapses raw model output to `dimension` values.
///
/// Output of exactly `dimension` values is used as is. Output of
/// `tokens * dimension` values is averaged over the token axis.
pub fn pool(raw: Vec<Number>, dimension: usize) -> Result<Vec<Number>> {
    if raw.len() == dimension {
        return Ok(raw);
    }
    if dimension == 0 || raw.len() < dimension || raw.len() % dimension != 0 {
        return Err(SemdexError::ExternalFailure(format!(
            "model output of {} values cannot be pooled to dimension {dimension}",
            raw.len()
        )));
    }

    let tokens = raw.len() / dimension;
    debug!(tokens, dimension, "mean pooling model output");
    let matrix = Array2::from_shape_vec((tokens, dimension), raw)
        .map_err(|e| SemdexError::ExternalFailure(format!("pooling failed: {e}")))?;
    matrix
        .mean_axis(Axis(0))
        .map(|mean| mean.to_vec())
        .ok_or_else(|| SemdexError::ExternalFailure("pooling over zero tokens".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Emits `tokens` rows; row `t` holds the token id at position `t` in
    /// every column.
    struct EchoModel {
        input_length: usize,
        tokens: usize,
        dimension: usize,
    }

    impl ScoringModel for EchoModel {
        fn input_length(&self) -> usize {
            self.input_length
        }

        fn infer(&mut self, input_ids: &[i64]) -> Result<Vec<Number>> {
            assert_eq!(input_ids.len(), self.input_length);
            Ok((0..self.tokens)
                .flat_map(|t| std::iter::repeat(input_ids[t] as Number).take(self.dimension))
                .collect())
        }
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        tokens: usize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<Box<dyn ScoringModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoModel {
                input_length: 8,
                tokens: self.tokens,
                dimension: 4,
            }))
        }
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self) -> Result<Box<dyn ScoringModel>> {
            Err(SemdexError::ExternalFailure("no model".to_string()))
        }
    }

    fn embedder(tokens: usize) -> (Embedder, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            loads: Arc::clone(&loads),
            tokens,
        };
        let tokenizer = HashTokenizer::new(TokenizerScheme::HashV1, 101);
        (Embedder::new(loader, tokenizer, 4), loads)
    }

    #[test]
    fn model_loads_lazily_and_once() {
        let (embedder, loads) = embedder(1);
        assert!(!embedder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        embedder.embed("first").unwrap();
        embedder.embed("second").unwrap();
        assert!(embedder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let (embedder, loads) = embedder(2);
        let embedder = Arc::new(embedder);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let embedder = Arc::clone(&embedder);
                thread::spawn(move || embedder.embed(&format!("text {i}")).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 4);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn output_is_unit_length() {
        let (embedder, _) = embedder(3);
        let v = embedder.embed("some words here").unwrap();
        let norm: Number = v.iter().map(|x| x * x).sum::<Number>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blank_text_embeds_to_zero_vector() {
        let (embedder, _) = embedder(1);
        assert_eq!(embedder.embed("   ").unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn load_failure_is_surfaced() {
        let embedder = Embedder::new(
            FailingLoader,
            HashTokenizer::new(TokenizerScheme::HashV1, 101),
            4,
        );
        assert!(matches!(
            embedder.embed("anything"),
            Err(SemdexError::ModelLoad(_))
        ));
        assert!(!embedder.is_loaded());
    }

    #[test]
    fn close_releases_the_handle() {
        let (embedder, _) = embedder(1);
        embedder.embed("warm up").unwrap();
        embedder.close();
        assert!(!embedder.is_loaded());
    }

    #[test]
    fn batch_reports_each_item() {
        let (embedder, _) = embedder(1);
        let seen = std::cell::RefCell::new(Vec::new());
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let vectors = embedder
            .embed_batch(&texts, &|f: f32| seen.borrow_mut().push(f))
            .unwrap();
        assert_eq!(vectors.len(), 4);
        assert_eq!(*seen.borrow(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn pool_passes_exact_output_through() {
        assert_eq!(pool(vec![1.0, 2.0, 3.0], 3).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn pool_averages_over_tokens() {
        let raw = vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0];
        assert_eq!(pool(raw, 3).unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn pool_rejects_incompatible_shapes() {
        assert!(pool(vec![1.0, 2.0], 3).is_err());
        assert!(pool(vec![1.0; 7], 3).is_err());
    }
}
