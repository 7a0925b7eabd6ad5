//! Timed, classified access to a provider client.

use super::{CompletionOptions, ModelProviderClient};
use crate::error::{ApiError, GenerationError};
use crate::prompt::PromptSpec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A provider client bound to the options and timeout of one role (tutor,
/// generator, or a grading tier).
#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn ModelProviderClient>, timeout: Duration) -> Self {
        Self {
            client,
            options: CompletionOptions::default(),
            timeout,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `provider/model`, for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.client.provider_name(), self.client.model_name())
    }

    /// One model call, bounded by the gateway timeout.
    pub async fn invoke(&self, prompt: &PromptSpec) -> Result<String, GenerationError> {
        let call = self.client.complete(prompt.to_messages(), self.options.clone());
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(ApiError::ProviderTimeout(_))) => Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(err)) => Err(GenerationError::Provider(err)),
            Ok(Ok(response)) => {
                debug!(
                    task = prompt.task.as_str(),
                    model = %self.label(),
                    tokens = response.usage.total_tokens,
                    "Model call completed"
                );
                Ok(response.content)
            }
        }
    }

    /// Call and parse, making up to `attempts` tries. Every failure kind is
    /// retried; the last error is returned when all attempts fail.
    pub async fn invoke_parsed<T, F>(
        &self,
        prompt: &PromptSpec,
        attempts: usize,
        parse: F,
    ) -> Result<T, GenerationError>
    where
        F: Fn(&str) -> Result<T, GenerationError>,
    {
        let attempts = attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let outcome = match self.invoke(prompt).await {
                Ok(raw) => parse(&raw),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        task = prompt.task.as_str(),
                        model = %self.label(),
                        attempt,
                        attempts,
                        kind = err.kind(),
                        error = %err,
                        "Model call failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| GenerationError::Malformed("no attempt made".to_string())))
    }
}
