//! Analysis stage: resilient report generation across model tiers
//!
//! **Algorithm:**
//! 1. Take the next model tier
//! 2. Try it up to `max_attempts` times; transient failures back off
//!    `base ^ attempt` seconds, any other failure abandons the tier at once
//! 3. First successful text wins; later tiers are never tried
//! 4. When every tier is exhausted, fail with the high-demand message

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::services::job_store::JobHandle;
use crate::types::{ProviderError, TextGenerator};
use crate::utils::retry::{retry_with_backoff, RetryError, RetryPolicy};

/// Generated report and the tier that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutput {
    pub text: String,
    pub model: String,
}

pub struct AnalysisStage {
    generator: Arc<dyn TextGenerator>,
    model_tiers: Vec<String>,
    retry: RetryPolicy,
}

impl AnalysisStage {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        model_tiers: Vec<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            model_tiers,
            retry,
        }
    }

    pub async fn run(
        &self,
        prompt: &str,
        handle: &JobHandle,
    ) -> Result<AnalysisOutput, PipelineError> {
        let job_id = handle.job_id();
        let tier_count = self.model_tiers.len();
        let mut last_error: Option<ProviderError> = None;

        for (tier_index, model) in self.model_tiers.iter().enumerate() {
            handle.checkpoint()?;

            let operation = format!("{} generation ({})", self.generator.name(), model);
            let outcome = retry_with_backoff(
                &operation,
                self.retry,
                handle.cancel_token(),
                ProviderError::is_transient,
                |attempt| {
                    handle.message(format!(
                        "Generating analysis with model {}/{} (attempt {}/{})...",
                        tier_index + 1,
                        tier_count,
                        attempt,
                        self.retry.max_attempts
                    ));
                    self.generator.generate(model, prompt)
                },
            )
            .await;

            match outcome {
                Ok(text) => {
                    info!(
                        job_id = %job_id,
                        model = %model,
                        chars = text.len(),
                        "Analysis generated"
                    );
                    return Ok(AnalysisOutput {
                        text,
                        model: model.clone(),
                    });
                }
                Err(RetryError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(RetryError::Aborted { attempt, error }) => {
                    warn!(
                        job_id = %job_id,
                        model = %model,
                        attempt,
                        error = %error,
                        "Model tier failed permanently, advancing to next tier"
                    );
                    last_error = Some(error);
                }
                Err(RetryError::Exhausted { attempts, error }) => {
                    warn!(
                        job_id = %job_id,
                        model = %model,
                        attempts,
                        error = %error,
                        "Model tier exhausted, advancing to next tier"
                    );
                    last_error = Some(error);
                }
            }
        }

        error!(
            job_id = %job_id,
            tiers = tier_count,
            last_error = ?last_error,
            "All model tiers exhausted"
        );
        Err(PipelineError::AnalysisUnavailable)
    }
}
