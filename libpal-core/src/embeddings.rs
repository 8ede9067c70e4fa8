//! Pluggable embedding providers.
//!
//! Provides a trait-based abstraction over sentence-embedding models, with
//! implementations for a local hashed bag-of-words model (always available,
//! offline), the Ollama API, and the OpenAI embeddings API.
//!
//! Every provider returns L2-normalized vectors of a fixed dimension, in the
//! same order as its input. Failures are reported, never papered over with
//! zero vectors.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, EmbeddingError, LibpalError};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Scale `vector` to unit length in place. Returns `false` for a zero vector,
/// which is left untouched.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    true
}

/// Check a provider's output against the embedding contract and normalize it.
///
/// Rejects a wrong vector count, a wrong dimension, non-finite components and
/// zero vectors.
pub fn conform_embeddings(
    mut vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::MalformedOutput {
            message: format!(
                "expected {} vectors, provider returned {}",
                expected_count,
                vectors.len()
            ),
        });
    }
    for (i, vector) in vectors.iter_mut().enumerate() {
        if vector.len() != dimensions {
            return Err(EmbeddingError::MalformedOutput {
                message: format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    dimensions
                ),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::MalformedOutput {
                message: format!("vector {} contains non-finite values", i),
            });
        }
        if !l2_normalize(vector) {
            return Err(EmbeddingError::MalformedOutput {
                message: format!("vector {} has zero norm", i),
            });
        }
    }
    Ok(vectors)
}

/// Local hashed bag-of-words embedder (always available, no network).
///
/// Each lowercase alphanumeric term is hashed into one of `dimensions`
/// buckets weighted by term frequency. Deterministic across runs and
/// platforms, which makes it the backend of choice for tests.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        if tf.is_empty() {
            // Punctuation-only or empty text still needs a unit vector.
            let idx = simple_hash(text.trim()) % self.dimensions;
            vector[idx] = 1.0;
            return vector;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// djb2 string hash. Stable across platforms, unlike `DefaultHasher`.
fn simple_hash(s: &str) -> usize {
    let mut hash: u64 = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash as usize
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

fn build_client() -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| EmbeddingError::Unavailable {
            provider: "http".into(),
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// Send a JSON request and return the parsed body, mapping transport and
/// HTTP failures to `Unavailable` and body errors to `MalformedOutput`.
async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, EmbeddingError> {
    let response =
        request
            .json(body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable {
                provider: provider.to_string(),
                message: e.to_string(),
            })?;

    let status = response.status();
    let body_text = response
        .text()
        .await
        .map_err(|e| EmbeddingError::Unavailable {
            provider: provider.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

    if !status.is_success() {
        return Err(EmbeddingError::Unavailable {
            provider: provider.to_string(),
            message: format!("HTTP {}: {}", status, body_text),
        });
    }

    serde_json::from_str(&body_text).map_err(|e| EmbeddingError::MalformedOutput {
        message: format!("invalid JSON from {}: {}", provider, e),
    })
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

const OLLAMA_DEFAULT_MODEL: &str = "all-minilm";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Output dimension of a remote model, when it is one we know.
///
/// `model` of `None` means the provider's default model.
pub fn known_model_dimensions(provider: &str, model: Option<&str>) -> Option<usize> {
    match provider {
        "ollama" => match model.unwrap_or(OLLAMA_DEFAULT_MODEL) {
            "all-minilm" => Some(384),
            "nomic-embed-text" => Some(768),
            "mxbai-embed-large" => Some(1024),
            _ => None,
        },
        "openai" => match model.unwrap_or(OPENAI_DEFAULT_MODEL) {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        },
        _ => None,
    }
}

/// Ollama embedding provider (`/api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(
        model: Option<String>,
        base_url: Option<String>,
        fallback_dims: usize,
    ) -> Result<Self, EmbeddingError> {
        let model = model.unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.into());
        let dims = known_model_dimensions("ollama", Some(&model)).unwrap_or(fallback_dims);
        Ok(Self {
            client: build_client()?,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        })
    }

    fn build_request_body(&self, texts: &[String]) -> Value {
        serde_json::json!({
            "model": self.model,
            "input": texts,
        })
    }

    fn parse_response(body: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let embeddings =
            body["embeddings"]
                .as_array()
                .ok_or_else(|| EmbeddingError::MalformedOutput {
                    message: "missing 'embeddings' array in Ollama response".into(),
                })?;
        embeddings
            .iter()
            .map(|v| {
                parse_vector(v).ok_or_else(|| EmbeddingError::MalformedOutput {
                    message: "non-numeric embedding in Ollama response".into(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.base_url);
        tracing::debug!(model = %self.model, count = texts.len(), "Requesting Ollama embeddings");
        let body = post_json(
            "ollama",
            self.client.post(&url),
            &self.build_request_body(texts),
        )
        .await?;
        let vectors = Self::parse_response(&body)?;
        conform_embeddings(vectors, texts.len(), self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// OpenAI embeddings API provider (`/v1/embeddings`).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        fallback_dims: usize,
    ) -> Result<Self, EmbeddingError> {
        let model = model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.into());
        let dims = known_model_dimensions("openai", Some(&model)).unwrap_or(fallback_dims);
        Ok(Self {
            client: build_client()?,
            api_key,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
        })
    }

    fn build_request_body(&self, texts: &[String]) -> Value {
        serde_json::json!({
            "model": self.model,
            "input": texts,
        })
    }

    /// Extract vectors from `data[]`, ordered by each entry's `index`.
    ///
    /// The indices must be exactly `0..n`.
    fn parse_response(body: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let data = body["data"]
            .as_array()
            .ok_or_else(|| EmbeddingError::MalformedOutput {
                message: "missing 'data' array in OpenAI response".into(),
            })?;
        let mut indexed = Vec::with_capacity(data.len());
        for (position, entry) in data.iter().enumerate() {
            let index = entry["index"].as_u64().map_or(position, |i| i as usize);
            let vector =
                parse_vector(&entry["embedding"]).ok_or_else(|| EmbeddingError::MalformedOutput {
                    message: format!("entry {} has no numeric 'embedding'", position),
                })?;
            indexed.push((index, vector));
        }
        indexed.sort_by_key(|(index, _)| *index);
        if indexed.iter().enumerate().any(|(expected, (index, _))| *index != expected) {
            return Err(EmbeddingError::MalformedOutput {
                message: format!(
                    "OpenAI response indices are not 0..{} without gaps or repeats",
                    indexed.len()
                ),
            });
        }
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v1/embeddings", self.base_url);
        tracing::debug!(model = %self.model, count = texts.len(), "Requesting OpenAI embeddings");
        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let body = post_json("openai", request, &self.build_request_body(texts)).await?;
        let vectors = Self::parse_response(&body)?;
        conform_embeddings(vectors, texts.len(), self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Create an embedder from configuration.
///
/// Unknown providers and missing credentials are configuration errors; there
/// is no silent fallback to the local embedder.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, LibpalError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            config.model.clone(),
            config.base_url.clone(),
            config.dimensions,
        )?)),
        "openai" => {
            let api_key =
                std::env::var(&config.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
                    var: config.api_key_env.clone(),
                })?;
            Ok(Arc::new(OpenAiEmbedder::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
                config.dimensions,
            )?))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown embedding provider '{}'", other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_local_embedder_dimensions_and_order() {
        let embedder = LocalEmbedder::new(64);
        let vectors = embedder
            .embed(&strings(&["cats are mammals", "rust is fast"]))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 64));
        assert_eq!(vectors[0], embedder.embed_one("cats are mammals"));
        assert_eq!(vectors[1], embedder.embed_one("rust is fast"));
    }

    #[test]
    fn test_local_embedder_is_normalized() {
        let embedder = LocalEmbedder::new(128);
        for text in ["hello world", "", "---", "a a a b"] {
            let v = embedder.embed_one(text);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm of {:?} was {}", text, norm);
        }
    }

    #[test]
    fn test_local_embedder_deterministic() {
        let a = LocalEmbedder::new(384).embed_one("The library opens at nine");
        let b = LocalEmbedder::new(384).embed_one("The library opens at nine");
        assert_eq!(a, b);
    }

    #[test]
    fn test_local_embedder_similar_texts_score_higher() {
        let embedder = LocalEmbedder::new(384);
        let query = embedder.embed_one("opening hours of the library");
        let related = embedder.embed_one("The library opening hours are 9 to 5");
        let unrelated = embedder.embed_one("Photosynthesis converts light into energy");
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 4];
        assert!(!l2_normalize(&mut v));
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn test_conform_rejects_wrong_count() {
        let err = conform_embeddings(vec![vec![1.0, 0.0]], 2, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedOutput { .. }));
    }

    #[test]
    fn test_conform_rejects_wrong_dimension() {
        let err = conform_embeddings(vec![vec![1.0, 0.0, 0.0]], 1, 2).unwrap_err();
        assert!(err.to_string().contains("dimension 3"));
    }

    #[test]
    fn test_conform_rejects_nan() {
        let err = conform_embeddings(vec![vec![f32::NAN, 1.0]], 1, 2).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_conform_normalizes() {
        let vectors = conform_embeddings(vec![vec![3.0, 4.0]], 1, 2).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ollama_parse_response() {
        let body = serde_json::json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]});
        let vectors = OllamaEmbedder::parse_response(&body).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_ollama_parse_response_missing_field() {
        let body = serde_json::json!({"error": "model not found"});
        assert!(OllamaEmbedder::parse_response(&body).is_err());
    }

    #[test]
    fn test_ollama_default_model_dimensions() {
        let embedder = OllamaEmbedder::new(None, None, 100).unwrap();
        assert_eq!(embedder.dimensions(), 384);
        let custom = OllamaEmbedder::new(Some("my-model".into()), None, 100).unwrap();
        assert_eq!(custom.dimensions(), 100);
    }

    #[test]
    fn test_ollama_request_body_batches_input() {
        let embedder = OllamaEmbedder::new(None, None, 384).unwrap();
        let body = embedder.build_request_body(&strings(&["a", "b"]));
        assert_eq!(body["model"], "all-minilm");
        assert_eq!(body["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_openai_parse_response_orders_by_index() {
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = OpenAiEmbedder::parse_response(&body).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_parse_response_rejects_repeated_index() {
        let body = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0]},
                {"index": 0, "embedding": [0.0, 1.0]}
            ]
        });
        let err = OpenAiEmbedder::parse_response(&body).unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedOutput { .. }));
    }

    #[test]
    fn test_openai_parse_response_rejects_out_of_range_index() {
        let body = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0]},
                {"index": 5, "embedding": [0.0, 1.0]}
            ]
        });
        assert!(OpenAiEmbedder::parse_response(&body).is_err());
    }

    #[tokio::test]
    async fn test_ollama_unreachable_is_unavailable() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let embedder =
            OllamaEmbedder::new(None, Some("http://127.0.0.1:9".into()), 384).unwrap();
        let err = embedder.embed(&strings(&["hello"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable { .. }));
    }

    #[test]
    fn test_create_embedder_local() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.provider_name(), "local");
        assert_eq!(embedder.dimensions(), 384);
    }

    #[test]
    fn test_create_embedder_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key_env: "LIBPALTEST_MISSING_EMBED_KEY".into(),
            ..Default::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(matches!(
            err,
            LibpalError::Config(ConfigError::EnvVarMissing { .. })
        ));
    }

    #[test]
    fn test_create_embedder_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
