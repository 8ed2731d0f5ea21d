use std::fmt;
use std::sync::Arc;

use formulate_config::Config;
use formulate_contracts::{ConnectionId, FormulaSolution, ServerEvent};
use formulate_kernel::{check_length, DecodeError, LengthCheck, TOO_LONG_REASON};
use thiserror::Error;

use crate::completion::{CompletionClient, UpstreamError};
use crate::generator::FormulaGenerator;
use crate::registry::ConnectionRegistry;
use crate::sinks::{ErrorLog, TrainingLog};
use crate::validator::PromptValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Feasibility,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Feasibility => "feasibility",
            Stage::Generation => "generation",
        })
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{stage} stage upstream error: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: UpstreamError,
    },
    #[error("{stage} stage parse error: {source}")]
    Parse {
        stage: Stage,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Clone)]
pub struct Request {
    pub connection_id: ConnectionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    TooLong,
    Infeasible(String),
    Solved(FormulaSolution),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_length: usize,
    pub model: String,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_length: cfg.requests.max_length,
            model: cfg.completion.model.clone(),
        }
    }
}

pub struct RequestOrchestrator {
    max_length: usize,
    validator: PromptValidator,
    generator: FormulaGenerator,
    registry: Arc<dyn ConnectionRegistry>,
    training_log: Option<TrainingLog>,
    error_log: ErrorLog,
}

impl RequestOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        client: Arc<dyn CompletionClient>,
        registry: Arc<dyn ConnectionRegistry>,
        training_log: Option<TrainingLog>,
        error_log: ErrorLog,
    ) -> Self {
        Self {
            max_length: settings.max_length,
            validator: PromptValidator::new(client.clone(), settings.model.clone()),
            generator: FormulaGenerator::new(client, settings.model),
            registry,
            training_log,
            error_log,
        }
    }

    pub async fn from_config(
        cfg: &Config,
        client: Arc<dyn CompletionClient>,
        registry: Arc<dyn ConnectionRegistry>,
    ) -> Result<Self, String> {
        let training_log = if cfg.requests.building_data {
            Some(TrainingLog::open(&cfg.logs.training_data_path).await?)
        } else {
            None
        };
        let error_log = ErrorLog::open(&cfg.logs.error_log_path).await?;
        Ok(Self::new(
            OrchestratorSettings::from_config(cfg),
            client,
            registry,
            training_log,
            error_log,
        ))
    }

    pub async fn handle(&self, request: Request) {
        tracing::info!(connection = %request.connection_id, ">{}", request.text);

        let outcome = match self.run(&request.text).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(connection = %request.connection_id, error = %err, "request dropped");
                self.error_log.record(&err, &request.text).await;
                return;
            }
        };

        let event = match &outcome {
            Outcome::TooLong => ServerEvent::invalid_prompt(TOO_LONG_REASON),
            Outcome::Infeasible(reason) => ServerEvent::invalid_prompt(reason.clone()),
            Outcome::Solved(solution) => ServerEvent::from(solution),
        };
        self.registry.send(&request.connection_id, event).await;

        if let (Outcome::Solved(solution), Some(log)) = (&outcome, &self.training_log) {
            log.record(&request.text, solution).await;
        }
    }

    async fn run(&self, text: &str) -> Result<Outcome, OrchestrationError> {
        if check_length(text, self.max_length) == LengthCheck::TooLong {
            return Ok(Outcome::TooLong);
        }

        let verdict = self.validator.check_feasibility(text).await?;
        if !verdict.possible {
            return Ok(Outcome::Infeasible(verdict.reason));
        }

        let solution = self.generator.generate(text).await?;
        Ok(Outcome::Solved(solution))
    }
}
