//! ONNX Runtime session for a headless ResNet feature extractor.
//!
//! The model is a ResNet-50 exported to ONNX with its final fully connected
//! layer removed, so the last output is the global-average-pooled feature map.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// Wraps an ONNX Runtime session for pooled CNN features.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct ResNetSession {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
    /// Name of the output tensor holding the pooled features.
    output_name: String,
}

impl ResNetSession {
    /// Load a feature extractor from an ONNX file.
    ///
    /// An empty `output_name` selects the model's first output.
    pub fn load(model_path: &Path, output_name: &str) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| {
                PipelineError::Embedding(format!("Failed to create ONNX session builder: {e}"))
            })?
            .commit_from_file(model_path)
            .map_err(|e| {
                PipelineError::Embedding(format!(
                    "Failed to load ONNX model {}: {e}",
                    model_path.display()
                ))
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "input".to_string());

        let output_name = if output_name.is_empty() {
            session
                .outputs()
                .first()
                .map(|o| o.name().to_string())
                .ok_or_else(|| PipelineError::Embedding("Model declares no outputs".to_string()))?
        } else {
            output_name.to_string()
        };

        tracing::debug!(
            "Loaded feature extractor from {:?} (input: {:?}, output: {:?})",
            model_path,
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Run inference on a preprocessed image tensor and return the pooled features.
    ///
    /// Input shape: \[1, 3, crop, crop\] (NCHW, ImageNet-normalized).
    /// Output: the flattened \[1, C, 1, 1\] or \[1, C\] feature tensor.
    pub fn embed(&self, preprocessed: &Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        let shape: Vec<i64> = preprocessed.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = preprocessed.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| PipelineError::Embedding(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Embedding(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| PipelineError::Embedding(format!("ONNX inference failed: {e}")))?;

        let features = outputs
            .iter()
            .find(|(name, _)| *name == self.output_name)
            .ok_or_else(|| {
                PipelineError::Embedding(format!(
                    "Model did not produce output {:?}",
                    self.output_name
                ))
            })?;

        let (shape, data) = features.1.try_extract_tensor::<f32>().map_err(|e| {
            PipelineError::Embedding(format!("Failed to extract feature tensor: {e}"))
        })?;

        flatten_pooled(&shape[..], data)
    }
}

/// Collapse a pooled feature tensor for a single image into one vector.
///
/// Accepts `[C]`, `[1, C]` and `[1, C, 1, 1]`; anything with spatial extent
/// left or a batch larger than one is rejected.
pub(crate) fn flatten_pooled(shape: &[i64], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
    let pooled = match shape {
        [_] => true,
        [1, _] => true,
        [1, _, 1, 1] => true,
        _ => false,
    };
    if !pooled {
        return Err(PipelineError::Embedding(format!(
            "Unexpected feature tensor shape: {:?}",
            shape
        )));
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_pooled_4d() {
        let data: Vec<f32> = (0..2048).map(|i| i as f32).collect();
        let flat = flatten_pooled(&[1, 2048, 1, 1], &data).unwrap();
        assert_eq!(flat.len(), 2048);
        assert_eq!(flat[2047], 2047.0);
    }

    #[test]
    fn test_flatten_pooled_2d_and_1d() {
        let data = vec![0.5f32; 16];
        assert_eq!(flatten_pooled(&[1, 16], &data).unwrap().len(), 16);
        assert_eq!(flatten_pooled(&[16], &data).unwrap().len(), 16);
    }

    #[test]
    fn test_flatten_pooled_rejects_spatial_map() {
        let data = vec![0.0f32; 2048 * 49];
        let err = flatten_pooled(&[1, 2048, 7, 7], &data).unwrap_err();
        assert!(err.to_string().contains("Unexpected feature tensor shape"));
    }

    #[test]
    fn test_flatten_pooled_rejects_batch() {
        let data = vec![0.0f32; 32];
        assert!(flatten_pooled(&[2, 16], &data).is_err());
    }

    #[test]
    fn test_load_missing_model_fails() {
        let result = ResNetSession::load(Path::new("/nonexistent/model.onnx"), "");
        assert!(matches!(result, Err(PipelineError::Embedding(_))));
    }
}
