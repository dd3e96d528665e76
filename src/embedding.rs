//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two concrete providers:
//!
//! - **[`RemoteProvider`]** calls a remote embedding API over HTTPS. The
//!   model id must be registered in [`KNOWN_MODELS`](crate::config::KNOWN_MODELS);
//!   construction fails fast on an unknown id.
//! - **[`TestProvider`]** is the designated offline sentinel
//!   (`test-model`): deterministic hash-derived vectors, no network.
//!
//! Providers are explicit values created from an [`IndexConfig`] and passed
//! into the indexer and searcher. There is no process-global client state.
//!
//! Failures from the remote backend surface as [`Error::Embedding`] and are
//! fatal to the current operation; the core performs no retries.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::config::{registered_dims, IndexConfig, TEST_MODEL, TEST_MODEL_DIMS};
use crate::error::{Error, Result};

/// Uniform interface over embedding backends: a batch of texts in, one
/// fixed-length vector per text out, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, recorded in index metadata.
    fn model_id(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Returns one vector per input, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text. Equivalent to a one-element batch.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }
}

/// Create the provider matching the configured model id.
pub fn create_provider(config: &IndexConfig) -> Result<Box<dyn EmbeddingProvider>> {
    if config.model == TEST_MODEL {
        return Ok(Box::new(TestProvider));
    }
    Ok(Box::new(RemoteProvider::new(config)?))
}

// ============ Remote provider ============

/// Bearer token environment variable for the remote embedding API.
const API_TOKEN_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

const DEFAULT_REGION: &str = "us-east-1";

/// Embedding provider backed by a remote model-invocation API.
///
/// Sends the whole batch in a single request for models that accept one
/// (`cohere.*`); Titan models take one text per invocation, so those are
/// issued sequentially within the same `embed_batch` call.
pub struct RemoteProvider {
    model: String,
    dims: usize,
    region: String,
    client: reqwest::Client,
}

impl RemoteProvider {
    /// Fails fast with [`Error::Validation`] if the model id is not in the
    /// registry.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let dims = registered_dims(&config.model).ok_or_else(|| {
            Error::Validation(format!("unknown embedding model '{}'", config.model))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims,
            region: config
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
            self.region, self.model
        )
    }

    fn api_token(&self) -> Result<String> {
        std::env::var(API_TOKEN_ENV)
            .map_err(|_| Error::Embedding(format!("{} environment variable not set", API_TOKEN_ENV)))
    }

    async fn invoke(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        let token = self.api_token()?;

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", token))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request to {} failed: {}", self.model, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "model {} returned {}: {}",
                self.model, status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid response from {}: {}", self.model, e)))
    }

    async fn embed_batched(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let json = self
            .invoke(serde_json::json!({
                "texts": texts,
                "input_type": "search_document",
            }))
            .await?;

        let rows = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Embedding("response missing 'embeddings' array".to_string()))?;

        rows.iter().map(parse_vector).collect()
    }

    async fn embed_one_by_one(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let json = self
                .invoke(serde_json::json!({ "inputText": text }))
                .await?;
            let row = json
                .get("embedding")
                .ok_or_else(|| Error::Embedding("response missing 'embedding' array".to_string()))?;
            vectors.push(parse_vector(row)?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch = texts.len(), "embedding batch");

        let vectors = if self.model.starts_with("cohere.") {
            self.embed_batched(texts).await?
        } else {
            self.embed_one_by_one(texts).await?
        };

        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>> {
    let values = value
        .as_array()
        .ok_or_else(|| Error::Embedding("embedding is not an array".to_string()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::Embedding("embedding contains a non-numeric value".to_string()))
        })
        .collect()
}

// ============ Test provider ============

/// Offline sentinel provider. Vectors are derived from a SHA-256 digest of
/// the input text, so equal texts embed identically across runs and
/// processes.
pub struct TestProvider;

#[async_trait]
impl EmbeddingProvider for TestProvider {
    fn model_id(&self) -> &str {
        TEST_MODEL
    }

    fn dims(&self) -> usize {
        TEST_MODEL_DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let first = Sha256::digest(text.as_bytes());
    let second = Sha256::digest(first);
    first
        .iter()
        .chain(second.iter())
        .map(|&b| b as f32 / 255.0 - 0.5)
        .collect()
}
