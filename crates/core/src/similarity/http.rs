use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::EmbeddingProvider;
use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::errors::AnalyticsError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible `/embeddings` endpoint (OpenAI itself, Ollama's `/v1`).
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    name: String,
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        dimension: usize,
        request_timeout: Duration,
    ) -> Result<Self, AnalyticsError> {
        let name = name.into();
        let client = Client::builder().timeout(request_timeout).build().map_err(|error| {
            AnalyticsError::DependencyError {
                dependency: format!("embedding provider `{name}`"),
                message: format!("could not build http client: {error}"),
            }
        })?;

        Ok(Self {
            endpoint: embeddings_endpoint(base_url),
            name,
            client,
            model: model.into(),
            api_key,
            dimension,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, AnalyticsError> {
        let (name, default_base) = match config.provider {
            EmbeddingProviderKind::OpenAi => ("openai", Some(OPENAI_BASE_URL)),
            EmbeddingProviderKind::Ollama => ("ollama", None),
            EmbeddingProviderKind::Hashing => {
                return Err(AnalyticsError::InvalidInput(
                    "the hashing provider does not use an http client".to_string(),
                ))
            }
        };
        let base_url = config.base_url.as_deref().or(default_base).ok_or_else(|| {
            AnalyticsError::InvalidInput(format!("embedding.base_url is required for {name}"))
        })?;

        Self::new(
            name,
            base_url,
            config.model.clone(),
            config.api_key.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn dependency_error(&self, message: String) -> AnalyticsError {
        AnalyticsError::DependencyError {
            dependency: format!("embedding provider `{}`", self.name),
            message,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AnalyticsError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest { model: &self.model, input: texts });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            warn!(
                event_name = "analytics.embedding.request_failed",
                provider = %self.name,
                error = %error,
                "embedding request failed"
            );
            self.dependency_error(error.to_string())
        })?;

        if !response.status().is_success() {
            warn!(
                event_name = "analytics.embedding.request_rejected",
                provider = %self.name,
                status = %response.status(),
                "embedding endpoint returned an error status"
            );
            return Err(self.dependency_error(format!("endpoint returned {}", response.status())));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| self.dependency_error(format!("malformed response: {error}")))?;

        let vectors = order_vectors(body, texts.len(), self.dimension)
            .map_err(|message| self.dependency_error(message))?;
        debug!(
            event_name = "analytics.embedding.batch_embedded",
            provider = %self.name,
            count = vectors.len(),
            "embedded batch"
        );
        Ok(vectors)
    }
}

fn embeddings_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/embeddings") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/embeddings")
    }
}

fn order_vectors(
    response: EmbeddingResponse,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, String> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in response.data {
        if datum.embedding.len() != dimension {
            return Err(format!(
                "vector {} has dimension {}, expected {dimension}",
                datum.index,
                datum.embedding.len()
            ));
        }
        match slots.get_mut(datum.index) {
            Some(slot) => *slot = Some(datum.embedding),
            None => return Err(format!("response index {} is out of range", datum.index)),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| format!("response is missing index {index}")))
        .collect()
}
