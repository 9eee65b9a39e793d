use std::path::Path;

use image::RgbImage;
use tract_onnx::prelude::*;

use super::{Classifier, ClassifyError, ImageModel};

/// ONNX graph with a fixed `[1, H, W, 3]` float input in [0,1] and one score
/// per class on its first output.
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
}

impl OnnxModel {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let side = Classifier::INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, side, side, 3)),
            )?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan })
    }
}

impl ImageModel for OnnxModel {
    fn predict(&self, image: &RgbImage) -> Result<Vec<f32>, ClassifyError> {
        let (width, height) = image.dimensions();
        let input: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, c)| image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
        .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let scores = outputs
            .first()
            .ok_or(ClassifyError::EmptyOutput)?
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        Ok(scores.iter().copied().collect())
    }
}
