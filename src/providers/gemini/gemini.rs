use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider, ProviderError};
use crate::providers::utils::with_timeout;

/// Upper bound on `requests` in a single `batchEmbedContents` call.
const MAX_BATCH: usize = 100;

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    api_url: String,
    client: Client,
    model: String,
    temperature: f32,
    timeout: std::time::Duration,
}

impl GeminiProvider {
    fn build(config: &ProviderConfig, model: &str) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            client,
            model: model_path(model),
            temperature: config.temperature,
            timeout: config.timeout,
        })
    }

    /// Provider for `generateContent` with the configured chat model.
    pub fn chat(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::build(config, &config.chat_model)
    }

    /// Provider for `embedContent`/`batchEmbedContents` with the configured embedding model.
    pub fn embeddings(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::build(config, &config.embedding_model)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{}", self.api_url, self.model, method)
    }

    async fn post(&self, method: &str, body: Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Gemini {} failed with {}: {}", method, status, body);
            return Err(ProviderError::Api { status: status.as_u16(), body });
        }

        Ok(response.json().await?)
    }

    fn content(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "content": { "parts": [{ "text": text }] }
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let requests: Vec<Value> = texts.iter().map(|text| self.content(text)).collect();
        let response = self
            .post("batchEmbedContents", json!({ "requests": requests }))
            .await?;

        let embeddings = response["embeddings"]
            .as_array()
            .ok_or_else(|| ProviderError::InvalidResponse("missing embeddings".to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        embeddings.iter().map(|e| parse_values(&e["values"])).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        with_timeout(self.timeout, async {
            let response = self.post("embedContent", self.content(text)).await?;
            parse_values(&response["embedding"]["values"])
        })
        .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            log::debug!("Embedding batch of {} texts with {}", batch.len(), self.model);
            let embedded = with_timeout(self.timeout, self.embed_chunk(batch)).await?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": { "temperature": self.temperature }
        });

        let response = with_timeout(self.timeout, self.post("generateContent", body)).await?;
        extract_text(&response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn parse_values(values: &Value) -> Result<Vec<f32>, ProviderError> {
    let values = values
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("missing embedding values".to_string()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("non-numeric value {}", v)))
        })
        .collect()
}

/// Joins the text parts of the first candidate.
fn extract_text(response: &Value) -> Result<String, ProviderError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = response["candidates"][0]["finishReason"]
                .as_str()
                .unwrap_or("no candidates");
            ProviderError::InvalidResponse(format!("no content in response ({})", reason))
        })?;

    Ok(parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .concat())
}
