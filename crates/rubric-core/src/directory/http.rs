//! Response directory served over HTTP.
//!
//! Endpoints (all `GET`, JSON bodies):
//!
//! - `{base}/prompts/{prompt_id}` -> [`PromptInfo`]
//! - `{base}/responses/{response_id}` -> [`ResponseInfo`]
//! - `{base}/responses/{response_id}/metadata` -> [`ResponseMetadata`]
//! - `{base}/models/{model_name}/responses` -> `[ResponseInfo]`
//!
//! A 404 maps to [`DirectoryError::NotFound`]; for metadata it means the
//! response has none.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    DirectoryError, DirectoryResult, PromptInfo, ResponseDirectory, ResponseInfo,
    ResponseMetadata,
};

const USER_AGENT: &str = concat!("rubric/", env!("CARGO_PKG_VERSION"));

/// Directory client for a remote prompt/response service.
#[derive(Debug, Clone)]
pub struct HttpResponseDirectory {
    base: Url,
    client: reqwest::Client,
}

impl HttpResponseDirectory {
    /// Create a client for `base_url`. `request_timeout` bounds each request.
    pub fn new(base_url: &str, request_timeout: Duration) -> DirectoryResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid base url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DirectoryError::Unavailable(format!(
                "invalid base url: {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Unavailable("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> DirectoryResult<Option<T>> {
        debug!(%url, "directory request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl ResponseDirectory for HttpResponseDirectory {
    async fn prompt(&self, prompt_id: &str) -> DirectoryResult<PromptInfo> {
        let url = self.endpoint(&["prompts", prompt_id])?;
        self.get_json(url)
            .await?
            .ok_or_else(|| DirectoryError::not_found("prompt", prompt_id))
    }

    async fn response(&self, response_id: &str) -> DirectoryResult<ResponseInfo> {
        let url = self.endpoint(&["responses", response_id])?;
        self.get_json(url)
            .await?
            .ok_or_else(|| DirectoryError::not_found("response", response_id))
    }

    async fn model_responses(&self, model_name: &str) -> DirectoryResult<Vec<ResponseInfo>> {
        let url = self.endpoint(&["models", model_name, "responses"])?;
        self.get_json(url)
            .await?
            .ok_or_else(|| DirectoryError::not_found("model", model_name))
    }

    async fn metadata(
        &self,
        response_ids: &[String],
    ) -> DirectoryResult<BTreeMap<String, ResponseMetadata>> {
        let lookups = response_ids.iter().map(|id| async move {
            let url = self.endpoint(&["responses", id, "metadata"])?;
            let meta: Option<ResponseMetadata> = self.get_json(url).await?;
            Ok::<_, DirectoryError>(meta.map(|m| (id.clone(), m)))
        });
        Ok(try_join_all(lookups).await?.into_iter().flatten().collect())
    }
}
