use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("model must not be empty")]
    EmptyModel,
}

/// A single generation call. Serializes to the upstream request body
/// `{"model", "prompt", "stream"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    model: String,
    prompt: String,
    stream: bool,
}

impl GenerationRequest {
    /// Build a request, falling back to `default_model` when `model` is absent.
    pub fn new(
        prompt: impl Into<String>,
        model: Option<String>,
        default_model: &str,
        stream: bool,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        let model = model.unwrap_or_else(|| default_model.to_string());
        if model.trim().is_empty() {
            return Err(ValidationError::EmptyModel);
        }
        Ok(Self {
            model,
            prompt,
            stream,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stream(&self) -> bool {
        self.stream
    }
}
