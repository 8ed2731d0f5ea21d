use std::sync::Arc;

use formulate_contracts::FeasibilityVerdict;
use formulate_kernel::{decode_verdict, feasibility_plan};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::orchestrator::{OrchestrationError, Stage};

pub struct PromptValidator {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl PromptValidator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn check_feasibility(
        &self,
        text: &str,
    ) -> Result<FeasibilityVerdict, OrchestrationError> {
        let plan = feasibility_plan(text);
        let raw = self
            .client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt: plan.prompt,
                temperature: plan.temperature,
                max_tokens: plan.max_tokens,
            })
            .await
            .map_err(|source| OrchestrationError::Upstream {
                stage: Stage::Feasibility,
                source,
            })?;
        let verdict = decode_verdict(&raw).map_err(|source| OrchestrationError::Parse {
            stage: Stage::Feasibility,
            source,
        })?;
        tracing::debug!(possible = verdict.possible, reason = %verdict.reason, "feasibility verdict");
        Ok(verdict)
    }
}
