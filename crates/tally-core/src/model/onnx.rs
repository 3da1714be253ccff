//! ONNX Runtime backend for the counting detector.
//!
//! The checkpoint is an ONNX graph exported with named inputs (`images`,
//! `exemplar_images`, `exemplars`, `labels`, and the BERT-style caption
//! inputs) and named outputs (`pred_logits`, `pred_boxes`). Captions are
//! tokenized here so that the word ids line up with the logit columns.
//!
//! Loading is non-strict: only inputs the graph actually declares are fed,
//! and graph inputs without a source are reported rather than refused.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array3};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tokenizers::Tokenizer;

use crate::error::ModelError;

use super::registry::BuildArgs;
use super::{CountingModel, Device, ModelInput, ModelOutput};

/// Graph inputs this backend knows how to fill.
const KNOWN_INPUTS: &[&str] = &[
    "images",
    "exemplar_images",
    "exemplars",
    "labels",
    "input_ids",
    "attention_mask",
    "token_type_ids",
];

const OUTPUT_LOGITS: &str = "pred_logits";
const OUTPUT_BOXES: &str = "pred_boxes";

/// Whether the CUDA execution provider can be used in this process.
pub fn cuda_available() -> bool {
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

/// Registry entry point.
pub(crate) fn build(args: &BuildArgs) -> Result<Box<dyn CountingModel>, ModelError> {
    Ok(Box::new(OnnxCountingModel::load(args)?))
}

/// Counting detector running in an ONNX Runtime session.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxCountingModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    input_names: Vec<String>,
}

fn load_error(path: &Path, message: String) -> ModelError {
    ModelError::Load {
        path: path.to_path_buf(),
        message,
    }
}

impl OnnxCountingModel {
    /// Load the checkpoint graph and caption tokenizer.
    pub fn load(args: &BuildArgs) -> Result<Self, ModelError> {
        let checkpoint = args.checkpoint.as_path();
        if !checkpoint.exists() {
            return Err(load_error(checkpoint, "Checkpoint not found".to_string()));
        }
        if !args.tokenizer.exists() {
            return Err(load_error(&args.tokenizer, "Tokenizer not found".to_string()));
        }

        let mut builder = Session::builder().map_err(|e| {
            load_error(checkpoint, format!("Failed to create ONNX session builder: {e}"))
        })?;

        if args.num_workers > 0 {
            builder = builder
                .with_intra_threads(args.num_workers)
                .map_err(|e| load_error(checkpoint, format!("Failed to set intra threads: {e}")))?;
        }

        if args.device == Device::Cuda {
            if cuda_available() {
                builder = builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(|e| {
                        load_error(checkpoint, format!("Failed to set CUDA execution provider: {e}"))
                    })?;
            } else {
                tracing::warn!("CUDA requested but not available, running on CPU");
            }
        }

        tracing::info!("Loading counting model from {:?}", checkpoint);
        let session = builder
            .commit_from_file(checkpoint)
            .map_err(|e| load_error(checkpoint, format!("Failed to load ONNX model: {e}")))?;

        let tokenizer = Tokenizer::from_file(&args.tokenizer)
            .map_err(|e| load_error(&args.tokenizer, format!("Failed to load tokenizer: {e}")))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        for name in &input_names {
            if !KNOWN_INPUTS.contains(&name.as_str()) {
                tracing::warn!("Checkpoint input {:?} has no source and will not be fed", name);
            }
        }
        for known in KNOWN_INPUTS {
            if !input_names.iter().any(|n| n == known) {
                tracing::debug!("Checkpoint does not take {:?}, skipping it", known);
            }
        }

        tracing::debug!(
            "Loaded counting model (inputs: {:?}, outputs: {:?})",
            input_names,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            input_names,
        })
    }

    fn tokenize(&self, captions: &[String]) -> Result<TokenBatch, ModelError> {
        let encodings = captions
            .iter()
            .map(|caption| {
                self.tokenizer
                    .encode(caption.as_str(), true)
                    .map_err(|e| ModelError::Inference(format!("Tokenization failed: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let batch_size = encodings.len();
        let max_length = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

        // Right-pad with zeros; attention_mask marks the real tokens.
        let mut batch = TokenBatch {
            shape: vec![batch_size as i64, max_length as i64],
            input_ids: vec![0; batch_size * max_length],
            attention_mask: vec![0; batch_size * max_length],
            token_type_ids: vec![0; batch_size * max_length],
            word_ids: Vec::with_capacity(batch_size),
        };

        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * max_length;
            for (j, &id) in encoding.get_ids().iter().enumerate() {
                batch.input_ids[offset + j] = id as i64;
            }
            for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
                batch.attention_mask[offset + j] = mask as i64;
            }
            for (j, &type_id) in encoding.get_type_ids().iter().enumerate() {
                batch.token_type_ids[offset + j] = type_id as i64;
            }
            batch.word_ids.push(
                encoding
                    .get_word_ids()
                    .iter()
                    .map(|w| w.map(|w| w as usize))
                    .collect(),
            );
        }

        Ok(batch)
    }
}

/// Tokenized captions, flattened for the session.
struct TokenBatch {
    shape: Vec<i64>,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
    word_ids: Vec<Vec<Option<usize>>>,
}

fn f32_input(shape: &[usize], data: Vec<f32>) -> Result<SessionInputValue<'static>, ModelError> {
    let shape: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
    let value = Value::from_array((shape, data))
        .map_err(|e| ModelError::Inference(format!("Failed to create input tensor: {e}")))?;
    Ok(value.into())
}

fn i64_input(shape: Vec<i64>, data: Vec<i64>) -> Result<SessionInputValue<'static>, ModelError> {
    let value = Value::from_array((shape, data))
        .map_err(|e| ModelError::Inference(format!("Failed to create input tensor: {e}")))?;
    Ok(value.into())
}

/// Stack per-image `N × 4` exemplar boxes into a `[B, N, 4]` buffer.
fn stack_exemplars(exemplars: &[Array2<f32>]) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
    let count = exemplars.first().map(|e| e.nrows()).unwrap_or(0);
    if exemplars.iter().any(|e| e.nrows() != count || e.ncols() != 4) {
        return Err(ModelError::Inference(
            "Exemplar boxes must be N x 4 with the same N for every image".to_string(),
        ));
    }
    let data = exemplars.iter().flat_map(|e| e.iter().copied()).collect();
    Ok((vec![exemplars.len(), count, 4], data))
}

/// Stack per-image label lists into a `[B, L]` buffer.
fn stack_labels(labels: &[Vec<i64>]) -> Result<(Vec<i64>, Vec<i64>), ModelError> {
    let width = labels.first().map(Vec::len).unwrap_or(0);
    if labels.iter().any(|l| l.len() != width) {
        return Err(ModelError::Inference(
            "Label lists must have the same length for every image".to_string(),
        ));
    }
    let data = labels.iter().flatten().copied().collect();
    Ok((vec![labels.len() as i64, width as i64], data))
}

fn to_array3(name: &str, shape: &[i64], data: &[f32]) -> Result<Array3<f32>, ModelError> {
    let shape_error = || ModelError::Shape {
        name: name.to_string(),
        shape: shape.to_vec(),
    };
    if shape.len() != 3 || shape.iter().any(|&d| d < 0) {
        return Err(shape_error());
    }
    let dims = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
    Array3::from_shape_vec(dims, data.to_vec()).map_err(|_| shape_error())
}

impl CountingModel for OnnxCountingModel {
    fn forward(&self, input: &ModelInput) -> Result<ModelOutput, ModelError> {
        let tokens = self.tokenize(&input.captions)?;

        let mut feeds: Vec<(String, SessionInputValue<'static>)> = Vec::new();
        for name in &self.input_names {
            let value = match name.as_str() {
                "images" => f32_input(input.images.shape(), input.images.iter().copied().collect())?,
                "exemplar_images" => f32_input(
                    input.exemplar_images.shape(),
                    input.exemplar_images.iter().copied().collect(),
                )?,
                "exemplars" => {
                    let (shape, data) = stack_exemplars(&input.exemplars)?;
                    f32_input(&shape, data)?
                }
                "labels" => {
                    let (shape, data) = stack_labels(&input.labels)?;
                    i64_input(shape, data)?
                }
                "input_ids" => i64_input(tokens.shape.clone(), tokens.input_ids.clone())?,
                "attention_mask" => i64_input(tokens.shape.clone(), tokens.attention_mask.clone())?,
                "token_type_ids" => i64_input(tokens.shape.clone(), tokens.token_type_ids.clone())?,
                _ => continue,
            };
            feeds.push((name.clone(), value));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| ModelError::Inference(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(feeds)
            .map_err(|e| ModelError::Inference(format!("ONNX inference failed: {e}")))?;

        let extract = |name: &str| -> Result<Array3<f32>, ModelError> {
            let (_, value) = outputs
                .iter()
                .find(|(n, _)| *n == name)
                .ok_or_else(|| ModelError::MissingOutput(name.to_string()))?;
            let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                ModelError::Inference(format!("Failed to extract {name} tensor: {e}"))
            })?;
            to_array3(name, shape, data)
        };

        let pred_logits = extract(OUTPUT_LOGITS)?;
        let pred_boxes = extract(OUTPUT_BOXES)?;

        tracing::debug!(
            "Forward pass over {} image(s): logits {:?}, boxes {:?}",
            input.batch_size(),
            pred_logits.shape(),
            pred_boxes.shape()
        );

        Ok(ModelOutput {
            pred_logits,
            pred_boxes,
            word_ids: tokens.word_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stack_exemplars_single_image() {
        let exemplars = vec![array![[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]];
        let (shape, data) = stack_exemplars(&exemplars).unwrap();
        assert_eq!(shape, vec![1, 2, 4]);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_stack_exemplars_without_boxes() {
        let exemplars = vec![Array2::<f32>::zeros((0, 4))];
        let (shape, data) = stack_exemplars(&exemplars).unwrap();
        assert_eq!(shape, vec![1, 0, 4]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_stack_exemplars_ragged_batch_rejected() {
        let exemplars = vec![Array2::<f32>::zeros((1, 4)), Array2::<f32>::zeros((2, 4))];
        assert!(stack_exemplars(&exemplars).is_err());
    }

    #[test]
    fn test_stack_labels() {
        let (shape, data) = stack_labels(&[vec![0]]).unwrap();
        assert_eq!(shape, vec![1, 1]);
        assert_eq!(data, vec![0]);
        assert!(stack_labels(&[vec![0], vec![0, 1]]).is_err());
    }

    #[test]
    fn test_to_array3_checks_shape() {
        let data = vec![0.0; 2 * 3 * 4];
        let array = to_array3("pred_logits", &[2, 3, 4], &data).unwrap();
        assert_eq!(array.shape(), &[2, 3, 4]);

        assert!(matches!(
            to_array3("pred_logits", &[6, 4], &data),
            Err(ModelError::Shape { .. })
        ));
        assert!(to_array3("pred_logits", &[2, 3, 5], &data).is_err());
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let args = BuildArgs {
            checkpoint: dir.path().join("missing.onnx"),
            tokenizer: dir.path().join("tokenizer.json"),
            device: Device::Cpu,
            num_workers: 1,
        };
        let err = OnnxCountingModel::load(&args).err().unwrap();
        assert!(err.to_string().contains("Checkpoint not found"));
    }
}
