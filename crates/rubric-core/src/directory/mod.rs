//! Response directory: the external prompt/response store.
//!
//! Rubric never owns prompts or responses. It looks them up by id to check
//! that submitted responses belong to their prompt, to map responses to
//! model names, and to join latency/length metadata into snapshots.

pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpResponseDirectory;
pub use memory::{Catalog, CatalogResponse, MemoryResponseDirectory};

/// A prompt and the responses recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub prompt_id: String,
    #[serde(default)]
    pub response_ids: Vec<String>,
}

/// Identity of one model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub response_id: String,
    pub prompt_id: String,
    pub model_name: String,
}

/// Measured properties of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Generation latency in milliseconds
    #[serde(default)]
    pub latency_ms: Option<f64>,
    /// Response length (tokens, or characters when the source has no tokenizer)
    #[serde(default)]
    pub length: Option<u64>,
}

/// Errors returned by a [`ResponseDirectory`].
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("invalid directory payload: {0}")]
    Decode(String),
}

impl DirectoryError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        DirectoryError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

/// Result type for directory lookups
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Lookup-by-id contract for prompts and responses.
#[async_trait]
pub trait ResponseDirectory: Send + Sync {
    /// Look up a prompt. `NotFound` if unknown.
    async fn prompt(&self, prompt_id: &str) -> DirectoryResult<PromptInfo>;

    /// Look up a response. `NotFound` if unknown.
    async fn response(&self, response_id: &str) -> DirectoryResult<ResponseInfo>;

    /// All responses produced by a model. `NotFound` if the model is unknown.
    async fn model_responses(&self, model_name: &str) -> DirectoryResult<Vec<ResponseInfo>>;

    /// Metadata for the given responses. Responses without metadata are
    /// absent from the map.
    async fn metadata(
        &self,
        response_ids: &[String],
    ) -> DirectoryResult<BTreeMap<String, ResponseMetadata>>;
}
