//! Structured-output model seam.
//!
//! The language-model invocation layer is an external collaborator: given a
//! prompt and a JSON schema it returns a value conforming to the schema, or
//! an error. Everything behind the trait (provider, auth, retries at the
//! HTTP layer) is out of scope here.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one structured completion. The returned value is expected to
    /// conform to `schema`; callers still validate by deserializing into
    /// their typed output.
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError>;
}

/// Default client posting to a structured-completion HTTP endpoint.
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError> {
        let url = format!("{}/v1/structured", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "response_schema": schema,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::Transport(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }

        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        match payload.get_mut("output") {
            Some(output) => Ok(output.take()),
            None => Err(ModelError::InvalidResponse(
                "response missing `output` field".to_string(),
            )),
        }
    }
}
