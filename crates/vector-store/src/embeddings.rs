use crate::error::{Result, VectorStoreError};
use ndarray::{Array, Axis, Ix2, Ix3};
use once_cell::sync::OnceCell;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

/// Which embedding backend to run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Local ONNX model via ONNX Runtime (CPU execution provider).
    Fast,
    /// Deterministic pseudo-embeddings derived from a hash of the text.
    /// Lets indexing, retrieval, and tests run without model assets.
    Stub,
}

impl EmbeddingMode {
    /// Read `KB_EMBEDDING_MODE` ('fast' or 'stub', default 'fast').
    pub fn from_env() -> Result<Self> {
        let raw = env::var("KB_EMBEDDING_MODE")
            .unwrap_or_else(|_| "fast".to_string())
            .to_ascii_lowercase();
        match raw.as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported KB_EMBEDDING_MODE '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }
}

/// Where the ONNX model and tokenizer live, and their shape parameters.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub max_batch: usize,
}

impl ModelSpec {
    /// Resolve from `KB_MODEL_DIR` (default `./models`), expecting
    /// `model.onnx` and `tokenizer.json` inside. Shape parameters come from
    /// `KB_EMBEDDING_DIMENSION` / `KB_EMBEDDING_MAX_LENGTH` /
    /// `KB_EMBEDDING_MAX_BATCH`, defaulting to the bge-small layout.
    pub fn from_env() -> Result<Self> {
        let dir = env::var("KB_MODEL_DIR").map_or_else(|_| PathBuf::from("models"), PathBuf::from);
        Ok(Self {
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
            dimension: env_usize("KB_EMBEDDING_DIMENSION", 384)?,
            max_length: env_usize("KB_EMBEDDING_MAX_LENGTH", 512)?,
            max_batch: env_usize("KB_EMBEDDING_MAX_BATCH", 32)?,
        })
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Invalid {name} '{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

// One ONNX session per process; single-knowledge-base scope.
static BACKEND: OnceCell<Arc<OrtBackend>> = OnceCell::new();

impl OrtBackend {
    fn shared(spec: &ModelSpec) -> Result<Arc<OrtBackend>> {
        BACKEND
            .get_or_try_init(|| Self::new(spec).map(Arc::new))
            .cloned()
    }

    fn new(spec: &ModelSpec) -> Result<Self> {
        if !spec.model_path.exists() || !spec.tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files are missing. Expected ONNX at {} and tokenizer at {} (set KB_MODEL_DIR, or run with KB_EMBEDDING_MODE=stub).",
                spec.model_path.display(),
                spec.tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&spec.tokenizer_path)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let session = Session::builder()
            .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!(
                    "Failed to register CPU execution provider: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&spec.model_path)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX embedding model {} (dim {}, max_length {}, batch {})",
            spec.model_path.display(),
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}"))
                })?;
            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if seq_len > self.max_length || encodings.iter().any(|e| e.len() != seq_len) {
                return Err(VectorStoreError::EmbeddingError(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }

            let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);
            let rows = batch.len();
            let ids_array = Array::from_shape_vec((rows, seq_len), ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("IDs shape error: {e}")))?;
            let mask_array = Array::from_shape_vec((rows, seq_len), masks)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Mask shape error: {e}")))?;
            let type_array = Array::from_shape_vec((rows, seq_len), type_ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Types shape error: {e}")))?;

            let mut available: HashMap<String, DynTensor> = HashMap::new();
            available.insert(
                "input_ids".to_string(),
                Tensor::from_array(ids_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );
            available.insert(
                "attention_mask".to_string(),
                Tensor::from_array(mask_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );
            available.insert(
                "token_type_ids".to_string(),
                Tensor::from_array(type_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );

            let array = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
                })?;

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let key = input.name.clone();
                    match available.get(&key) {
                        Some(value) => {
                            feed.insert(key, value.clone());
                        }
                        None => {
                            return Err(VectorStoreError::EmbeddingError(format!(
                                "Unsupported ONNX input '{key}'"
                            )));
                        }
                    }
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::EmbeddingError(
                        "ONNX returned no outputs".to_string(),
                    ));
                }

                outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "Failed to decode ONNX output: {e}"
                        ))
                    })?
                    .to_owned()
            };

            results.extend(embeddings_from_output(array, &mask_rows, self.dimension)?);
        }

        Ok(results)
    }
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        // Already pooled: (batch, dim)
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for row in embeddings.outer_iter() {
                let mut emb = row.to_owned().to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        // Token-level hidden states (batch, seq, dim): mean pool over the
        // attention mask.
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let mask = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &mask);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }

        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Deterministic unit vector derived from a hash of the text. Texts that
/// are equal embed identically; different texts almost surely do not.
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Clone)]
enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub { dimension: usize },
}

/// Embedding model computing one dense vector per text.
///
/// Vectors are L2-normalized, so cosine similarity of two embeddings is
/// their dot product. Cloning is cheap: the ONNX backend is shared.
#[derive(Clone)]
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
}

impl EmbeddingModel {
    /// Build the backend selected by `KB_EMBEDDING_MODE`.
    pub fn from_env() -> Result<Self> {
        match EmbeddingMode::from_env()? {
            EmbeddingMode::Fast => {
                let spec = ModelSpec::from_env()?;
                Ok(Self {
                    dimension: spec.dimension,
                    backend: EmbeddingBackend::Ort(OrtBackend::shared(&spec)?),
                })
            }
            EmbeddingMode::Stub => {
                let spec = ModelSpec::from_env()?;
                Ok(Self::stub(spec.dimension))
            }
        }
    }

    /// Deterministic stub backend, for tests and offline use.
    #[must_use]
    pub const fn stub(dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Stub { dimension },
            dimension,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let owned: Vec<String> = texts.into_iter().map(ToString::to_string).collect();
        match &self.backend {
            EmbeddingBackend::Stub { dimension } => {
                let dimension = *dimension;
                Ok(owned.iter().map(|t| stub_embed(t, dimension)).collect())
            }
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))?
            }
        }
    }

    #[must_use]
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_embeddings_are_deterministic() {
        let model = EmbeddingModel::stub(64);
        let a = stub_embed("hello world", model.dimension());
        let b = stub_embed("hello world", model.dimension());
        assert_eq!(a, b);

        let c = stub_embed("something else", model.dimension());
        assert_ne!(a, c);
    }

    #[test]
    fn stub_embeddings_are_unit_length() {
        let emb = stub_embed("normalize me", 128);
        let norm: f32 = emb.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[tokio::test]
    async fn stub_batch_matches_singles() {
        let model = EmbeddingModel::stub(32);
        let batch = model.embed_batch(vec!["one", "two"]).await.unwrap();
        let one = model.embed("one").await.unwrap();
        let two = model.embed("two").await.unwrap();
        assert_eq!(batch, vec![one, two]);
    }

    #[test]
    fn cosine_similarity_bounds() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((EmbeddingModel::cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![1.0, 0.0];
        let d = vec![0.0, 1.0];
        assert!(EmbeddingModel::cosine_similarity(&c, &d).abs() < 1e-6);

        let e = vec![1.0, 0.0];
        let f = vec![-1.0, 0.0];
        assert!((EmbeddingModel::cosine_similarity(&e, &f) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(
            EmbeddingModel::cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]),
            0.0
        );
    }

    #[test]
    fn mean_pool_respects_attention_mask() {
        let sample = ndarray::array![[2.0f32, 4.0], [10.0, 20.0], [100.0, 200.0]];
        // Only the first two tokens are real.
        let pooled = mean_pool(sample.view(), &[1, 1, 0]);
        assert_eq!(pooled, vec![6.0, 12.0]);
    }
}
