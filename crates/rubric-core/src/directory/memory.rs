//! In-process response directory, optionally loaded from a JSON catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    DirectoryError, DirectoryResult, PromptInfo, ResponseDirectory, ResponseInfo,
    ResponseMetadata,
};
use crate::domain::{Result, RubricError};

/// One response entry in a catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub response_id: String,
    pub prompt_id: String,
    pub model_name: String,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub length: Option<u64>,
}

/// Catalog file contents: prompts (possibly without responses yet) and
/// responses.
///
/// ```json
/// {
///   "prompts": ["p1"],
///   "responses": [
///     {"response_id": "r1", "prompt_id": "p1", "model_name": "a", "latency_ms": 820.0}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub responses: Vec<CatalogResponse>,
}

#[derive(Debug, Default)]
struct CatalogState {
    prompts: BTreeMap<String, BTreeSet<String>>,
    responses: HashMap<String, CatalogResponse>,
    models: BTreeMap<String, BTreeSet<String>>,
}

/// Directory backed by an in-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryResponseDirectory {
    state: RwLock<CatalogState>,
}

impl MemoryResponseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: Catalog) -> Self {
        let dir = Self::new();
        for prompt_id in catalog.prompts {
            dir.register_prompt(prompt_id);
        }
        for response in catalog.responses {
            dir.register(response);
        }
        dir
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_catalog(parse_catalog(&content)?))
    }

    /// Register a prompt that may not have responses yet.
    pub fn register_prompt(&self, prompt_id: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.prompts.entry(prompt_id.into()).or_default();
        }
    }

    /// Register (or replace) a response and its prompt.
    pub fn register(&self, response: CatalogResponse) {
        if let Ok(mut state) = self.state.write() {
            if let Some(previous) = state.responses.get(&response.response_id).cloned() {
                if let Some(ids) = state.models.get_mut(&previous.model_name) {
                    ids.remove(&previous.response_id);
                }
                if let Some(ids) = state.prompts.get_mut(&previous.prompt_id) {
                    ids.remove(&previous.response_id);
                }
            }
            state
                .prompts
                .entry(response.prompt_id.clone())
                .or_default()
                .insert(response.response_id.clone());
            state
                .models
                .entry(response.model_name.clone())
                .or_default()
                .insert(response.response_id.clone());
            state
                .responses
                .insert(response.response_id.clone(), response);
        }
    }

    /// Register a response without metadata.
    pub fn register_response(
        &self,
        response_id: impl Into<String>,
        prompt_id: impl Into<String>,
        model_name: impl Into<String>,
    ) {
        self.register(CatalogResponse {
            response_id: response_id.into(),
            prompt_id: prompt_id.into(),
            model_name: model_name.into(),
            latency_ms: None,
            length: None,
        });
    }

    fn read(&self) -> DirectoryResult<std::sync::RwLockReadGuard<'_, CatalogState>> {
        self.state
            .read()
            .map_err(|_| DirectoryError::Unavailable("catalog lock poisoned".to_string()))
    }
}

fn info(entry: &CatalogResponse) -> ResponseInfo {
    ResponseInfo {
        response_id: entry.response_id.clone(),
        prompt_id: entry.prompt_id.clone(),
        model_name: entry.model_name.clone(),
    }
}

#[async_trait]
impl ResponseDirectory for MemoryResponseDirectory {
    async fn prompt(&self, prompt_id: &str) -> DirectoryResult<PromptInfo> {
        let state = self.read()?;
        state
            .prompts
            .get(prompt_id)
            .map(|ids| PromptInfo {
                prompt_id: prompt_id.to_string(),
                response_ids: ids.iter().cloned().collect(),
            })
            .ok_or_else(|| DirectoryError::not_found("prompt", prompt_id))
    }

    async fn response(&self, response_id: &str) -> DirectoryResult<ResponseInfo> {
        let state = self.read()?;
        state
            .responses
            .get(response_id)
            .map(info)
            .ok_or_else(|| DirectoryError::not_found("response", response_id))
    }

    async fn model_responses(&self, model_name: &str) -> DirectoryResult<Vec<ResponseInfo>> {
        let state = self.read()?;
        let ids = state
            .models
            .get(model_name)
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| DirectoryError::not_found("model", model_name))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.responses.get(id))
            .map(info)
            .collect())
    }

    async fn metadata(
        &self,
        response_ids: &[String],
    ) -> DirectoryResult<BTreeMap<String, ResponseMetadata>> {
        let state = self.read()?;
        Ok(response_ids
            .iter()
            .filter_map(|id| state.responses.get(id))
            .filter(|entry| entry.latency_ms.is_some() || entry.length.is_some())
            .map(|entry| {
                (
                    entry.response_id.clone(),
                    ResponseMetadata {
                        latency_ms: entry.latency_ms,
                        length: entry.length,
                    },
                )
            })
            .collect())
    }
}

impl From<Catalog> for MemoryResponseDirectory {
    fn from(catalog: Catalog) -> Self {
        Self::from_catalog(catalog)
    }
}

fn parse_catalog(json: &str) -> Result<Catalog> {
    serde_json::from_str(json).map_err(RubricError::from)
}
