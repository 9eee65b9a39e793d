use std::cmp::Ordering;
use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

mod onnx;

pub use onnx::OnnxModel;

/// The closed label set every classification resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Buy, Signal::Sell, Signal::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Neutral => "NEUTRAL",
        }
    }

    /// Map a model output index onto the label set.
    pub fn from_index(index: usize) -> Option<Signal> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a classification came from: a real model run or the fallback sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Model,
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Model => "model",
            Source::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Classification {
    pub label: Signal,
    pub confidence: f64,
    pub source: Source,
}

/// What to do when no model is loaded or a model run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Answer with a uniformly random label and a confidence in [0.5, 0.95).
    #[default]
    Random,
    /// Surface the failure to the caller instead of guessing.
    Reject,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(FallbackPolicy::Random),
            "reject" => Ok(FallbackPolicy::Reject),
            other => Err(format!("unknown fallback policy {other:?}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("model returned no scores")]
    EmptyOutput,
    #[error("model class index {0} outside label set")]
    UnknownClass(usize),
    #[error("no model available")]
    Unavailable,
}

/// Seam for the predictive model itself; the graph format stays behind it.
pub trait ImageModel: Send + Sync {
    /// Score an already-resized RGB input, one score per class index.
    fn predict(&self, image: &RgbImage) -> Result<Vec<f32>, ClassifyError>;
}

/// Maps image bytes to a labeled classification, with an explicit policy for
/// the no-model and model-failure paths.
pub struct Classifier {
    model: Option<Box<dyn ImageModel>>,
    policy: FallbackPolicy,
}

impl Classifier {
    pub const INPUT_SIZE: u32 = 224;

    /// Decide model availability once for the process lifetime: a missing or
    /// unloadable artifact means running without a model from here on.
    pub fn load(model_path: &Path, policy: FallbackPolicy) -> Self {
        let model: Option<Box<dyn ImageModel>> = if model_path.exists() {
            match OnnxModel::load(model_path) {
                Ok(m) => {
                    info!(path = %model_path.display(), "model loaded");
                    Some(Box::new(m))
                }
                Err(e) => {
                    warn!(error = %e, path = %model_path.display(), "could not load model");
                    None
                }
            }
        } else {
            info!(path = %model_path.display(), "no model artifact found");
            None
        };
        Self { model, policy }
    }

    pub fn from_parts(model: Option<Box<dyn ImageModel>>, policy: FallbackPolicy) -> Self {
        Self { model, policy }
    }

    pub fn mode(&self) -> &'static str {
        if self.model.is_some() {
            "model"
        } else {
            "fallback"
        }
    }

    /// Classify raw image bytes. Under the `random` policy this always
    /// succeeds; under `reject` a model-path failure is returned to the caller.
    pub fn classify(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError> {
        match self.run_model(image_bytes) {
            Ok(c) => Ok(c),
            Err(e) => match self.policy {
                FallbackPolicy::Random => {
                    warn!(error = %e, "classification fell back to a random guess");
                    Ok(Self::random_guess())
                }
                FallbackPolicy::Reject => Err(e),
            },
        }
    }

    fn run_model(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError> {
        let model = self.model.as_ref().ok_or(ClassifyError::Unavailable)?;

        let rgb = image::load_from_memory(image_bytes)?.to_rgb8();
        let resized = image::imageops::resize(
            &rgb,
            Self::INPUT_SIZE,
            Self::INPUT_SIZE,
            FilterType::Triangle,
        );

        let scores = model.predict(&resized)?;
        let (index, &score) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .ok_or(ClassifyError::EmptyOutput)?;
        let label = Signal::from_index(index).ok_or(ClassifyError::UnknownClass(index))?;

        Ok(Classification {
            label,
            confidence: score as f64,
            source: Source::Model,
        })
    }

    fn random_guess() -> Classification {
        let mut rng = rand::thread_rng();
        let label = Signal::ALL[rng.gen_range(0..Signal::ALL.len())];
        let confidence = rng.gen_range(0.5..0.95);
        Classification {
            label,
            confidence,
            source: Source::Fallback,
        }
    }
}
