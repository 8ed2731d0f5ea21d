use std::sync::Arc;

use formulate_contracts::FormulaSolution;
use formulate_kernel::{decode_solution, generation_plan};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::orchestrator::{OrchestrationError, Stage};

pub struct FormulaGenerator {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl FormulaGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn generate(&self, text: &str) -> Result<FormulaSolution, OrchestrationError> {
        let plan = generation_plan(text);
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
                stage: Stage::Generation,
                source,
            })?;
        decode_solution(&raw).map_err(|source| OrchestrationError::Parse {
            stage: Stage::Generation,
            source,
        })
    }
}
