//! Settings layered from defaults, `semdex_config.*` and `SEMDEX_*` variables.

use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Result, SemdexError};
use crate::tokenizer::TokenizerScheme;

pub type Number = f32;

pub const DEFAULT_INDEX_DIR: &str = ".semdex";
pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_OVERLAP: usize = 40;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_MAX_LENGTH: usize = 512;
pub const DEFAULT_VOCAB_SIZE: usize = 30522;

/// Raw values as found in `semdex_config.*` and `SEMDEX_*` variables.
#[derive(Deserialize, Default)]
pub struct SemdexConfig {
    pub index_dir: Option<String>,
    pub model_path: Option<String>,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub dimension: Option<usize>,
    pub max_length: Option<usize>,
    pub vocab_size: Option<usize>,
    pub tokenizer: Option<String>,
    pub parallel_scan: Option<bool>,
}

impl SemdexConfig {
    /// Missing keys stay `None`. A key that is present but cannot be parsed is
    /// an error.
    pub fn try_from(config: &Config) -> Result<Self> {
        Ok(SemdexConfig {
            index_dir: optional(config, "index_dir")?,
            model_path: optional(config, "model_path")?,
            chunk_size: optional(config, "chunk_size")?,
            overlap: optional(config, "overlap")?,
            top_k: optional(config, "top_k")?,
            dimension: optional(config, "dimension")?,
            max_length: optional(config, "max_length")?,
            vocab_size: optional(config, "vocab_size")?,
            tokenizer: optional(config, "tokenizer")?,
            parallel_scan: optional(config, "parallel_scan")?,
        })
    }
}

fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>> {
    match config.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Effective settings after defaults, config file and environment are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub index_dir: PathBuf,
    pub model_path: Option<PathBuf>,
    pub chunk_size: usize,
    pub overlap: usize,
    pub top_k: usize,
    pub dimension: usize,
    pub max_length: usize,
    pub vocab_size: usize,
    pub tokenizer: TokenizerScheme,
    pub parallel_scan: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            model_path: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            top_k: DEFAULT_TOP_K,
            dimension: DEFAULT_DIMENSION,
            max_length: DEFAULT_MAX_LENGTH,
            vocab_size: DEFAULT_VOCAB_SIZE,
            tokenizer: TokenizerScheme::default(),
            parallel_scan: false,
        }
    }
}

impl Settings {
    /// Reads `semdex_config` from the working directory (if any) and `SEMDEX_*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("semdex_config").required(false))
            .add_source(Environment::with_prefix("SEMDEX"))
            .build()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = SemdexConfig::try_from(config)?;
        let defaults = Settings::default();

        let tokenizer = match raw.tokenizer {
            Some(name) => name.parse()?,
            None => defaults.tokenizer,
        };

        let settings = Self {
            index_dir: raw
                .index_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            model_path: raw.model_path.map(PathBuf::from),
            chunk_size: raw.chunk_size.unwrap_or(defaults.chunk_size),
            overlap: raw.overlap.unwrap_or(defaults.overlap),
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            dimension: raw.dimension.unwrap_or(defaults.dimension),
            max_length: raw.max_length.unwrap_or(defaults.max_length),
            vocab_size: raw.vocab_size.unwrap_or(defaults.vocab_size),
            tokenizer,
            parallel_scan: raw.parallel_scan.unwrap_or(defaults.parallel_scan),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.chunk_size == 0, "chunk_size must be greater than 0"),
            (self.top_k == 0, "top_k must be greater than 0"),
            (self.dimension == 0, "dimension must be greater than 0"),
            (self.max_length == 0, "max_length must be greater than 0"),
            (self.vocab_size < 2, "vocab_size must be at least 2"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SemdexError::InvalidArgument((*message).to_string())),
            None => Ok(()),
        }
    }

    pub fn model_path(&self) -> Result<&PathBuf> {
        self.model_path.as_ref().ok_or_else(|| {
            SemdexError::InvalidArgument(
                "model_path not set in config, environment (SEMDEX_MODEL_PATH) or --model"
                    .to_string(),
            )
        })
    }

    pub fn print_config(&self) {
        println!("index_dir={}", self.index_dir.display());
        match &self.model_path {
            Some(path) => println!("model_path={}", path.display()),
            None => println!("model_path="),
        }
        println!("chunk_size={}", self.chunk_size);
        println!("overlap={}", self.overlap);
        println!("top_k={}", self.top_k);
        println!("dimension={}", self.dimension);
        println!("max_length={}", self.max_length);
        println!("vocab_size={}", self.vocab_size);
        println!("tokenizer={}", self.tokenizer);
        println!("parallel_scan={}", self.parallel_scan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn build(overrides: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::from_config(&build(&[])).unwrap();
        assert_eq!(settings.index_dir, PathBuf::from(DEFAULT_INDEX_DIR));
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.overlap, DEFAULT_OVERLAP);
        assert_eq!(settings.top_k, DEFAULT_TOP_K);
        assert_eq!(settings.dimension, 384);
        assert_eq!(settings.max_length, 512);
        assert_eq!(settings.tokenizer, TokenizerScheme::HashV1);
        assert!(!settings.parallel_scan);
        assert!(settings.model_path.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_config(&build(&[
            ("index_dir", "/tmp/idx"),
            ("model_path", "/models/minilm.onnx"),
            ("chunk_size", "64"),
            ("top_k", "3"),
            ("parallel_scan", "true"),
        ]))
        .unwrap();
        assert_eq!(settings.index_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(
            settings.model_path().unwrap(),
            &PathBuf::from("/models/minilm.onnx")
        );
        assert_eq!(settings.chunk_size, 64);
        assert_eq!(settings.top_k, 3);
        assert!(settings.parallel_scan);
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let err = Settings::from_config(&build(&[("top_k", "0")])).unwrap_err();
        assert!(matches!(err, SemdexError::InvalidArgument(_)));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Settings::from_config(&build(&[("top_k", "five")])).unwrap_err();
        assert!(matches!(err, SemdexError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = Settings::from_config(&build(&[("chunk_size", "-3")])).unwrap_err();
        assert!(matches!(err, SemdexError::Config(_)));
    }

    #[test]
    fn malformed_flag_is_rejected() {
        let err = Settings::from_config(&build(&[("parallel_scan", "maybe")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unknown_tokenizer_is_rejected() {
        let err = Settings::from_config(&build(&[("tokenizer", "wordpiece")])).unwrap_err();
        assert!(matches!(err, SemdexError::InvalidArgument(_)));
    }

    #[test]
    fn missing_model_path_is_reported() {
        let settings = Settings::default();
        assert!(matches!(
            settings.model_path(),
            Err(SemdexError::InvalidArgument(_))
        ));
    }
}
