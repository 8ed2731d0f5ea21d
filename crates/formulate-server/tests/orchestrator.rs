use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use formulate_contracts::{ConnectionId, ServerEvent};
use formulate_server::orchestrator::OrchestratorSettings;
use formulate_server::sinks::{ErrorLog, TrainingLog};
use formulate_server::{
    CompletionClient, CompletionRequest, ConnectionRegistry, Request, RequestOrchestrator,
    UpstreamError,
};
use serde_json::Value;

#[derive(Default)]
struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    calls: Mutex<Vec<CompletionRequest>>,
    routed: bool,
}

impl ScriptedCompletion {
    fn with(replies: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    fn routed() -> Arc<Self> {
        Arc::new(Self {
            routed: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let feasibility = request.prompt.starts_with("Is it possible");
        self.calls.lock().unwrap().push(request);
        if self.routed {
            return Ok(if feasibility { FEASIBLE } else { SOLUTION }.to_string());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Transport("no scripted reply".to_string())))
    }
}

#[derive(Default)]
struct RecordingRegistry {
    sent: Mutex<Vec<(ConnectionId, ServerEvent)>>,
}

impl RecordingRegistry {
    fn sent(&self) -> Vec<(ConnectionId, ServerEvent)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionRegistry for RecordingRegistry {
    async fn send(&self, connection: &ConnectionId, event: ServerEvent) -> bool {
        self.sent.lock().unwrap().push((connection.clone(), event));
        true
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    training_path: PathBuf,
    error_path: PathBuf,
    completion: Arc<ScriptedCompletion>,
    registry: Arc<RecordingRegistry>,
    orchestrator: RequestOrchestrator,
}

async fn harness(
    replies: Vec<Result<String, UpstreamError>>,
    max_length: usize,
    building_data: bool,
) -> Harness {
    harness_with(ScriptedCompletion::with(replies), max_length, building_data).await
}

async fn harness_with(
    completion: Arc<ScriptedCompletion>,
    max_length: usize,
    building_data: bool,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let training_path = dir.path().join("data.jsonl");
    let error_path = dir.path().join("log.txt");
    let registry = Arc::new(RecordingRegistry::default());
    let training_log = if building_data {
        Some(TrainingLog::open(&training_path).await.unwrap())
    } else {
        None
    };
    let orchestrator = RequestOrchestrator::new(
        OrchestratorSettings {
            max_length,
            model: "test-model".to_string(),
        },
        completion.clone(),
        registry.clone(),
        training_log,
        ErrorLog::open(&error_path).await.unwrap(),
    );
    Harness {
        _dir: dir,
        training_path,
        error_path,
        completion,
        registry,
        orchestrator,
    }
}

fn request(conn: &str, text: &str) -> Request {
    Request {
        connection_id: ConnectionId::from(conn),
        text: text.to_string(),
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

const FEASIBLE: &str = r#"{"Possible": true, "Reason": ""}"#;
const SOLUTION: &str = r#"{"ExcelFormula": "=A1+B1", "GoogleSheetsFormula": "=A1+B1"}"#;

#[tokio::test]
async fn feasible_request_yields_solution_to_originating_connection() {
    let h = harness(vec![Ok(FEASIBLE.to_string()), Ok(SOLUTION.to_string())], 250, true).await;

    h.orchestrator.handle(request("conn_a", "add two numbers")).await;

    assert_eq!(
        h.registry.sent(),
        vec![(
            ConnectionId::from("conn_a"),
            ServerEvent::Solution {
                excel_solution: "=A1+B1".to_string(),
                google_sheets_solution: "=A1+B1".to_string(),
            }
        )]
    );

    let calls = h.completion.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].max_tokens, 150);
    assert_eq!(calls[1].max_tokens, 200);
    assert!(calls.iter().all(|c| c.temperature == 0.0 && c.model == "test-model"));
    assert!(calls.iter().all(|c| c.prompt.contains("add two numbers")));
    assert!(read(&h.error_path).is_empty());
}

#[tokio::test]
async fn over_length_request_is_rejected_without_upstream_calls() {
    let h = harness(vec![], 250, true).await;

    h.orchestrator.handle(request("conn_a", &"x".repeat(251))).await;

    assert_eq!(
        h.registry.sent(),
        vec![(
            ConnectionId::from("conn_a"),
            ServerEvent::invalid_prompt("Too long!")
        )]
    );
    assert!(h.completion.calls().is_empty());
    assert!(read(&h.training_path).is_empty());
    assert!(read(&h.error_path).is_empty());
}

#[tokio::test]
async fn request_at_the_limit_is_accepted() {
    let h = harness(vec![Ok(FEASIBLE.to_string()), Ok(SOLUTION.to_string())], 250, false).await;

    h.orchestrator.handle(request("conn_a", &"x".repeat(250))).await;

    assert_eq!(h.completion.calls().len(), 2);
    assert!(matches!(h.registry.sent()[0].1, ServerEvent::Solution { .. }));
}

#[tokio::test]
async fn infeasible_verdict_forwards_reason_and_skips_generation() {
    let h = harness(
        vec![Ok(
            r#"{"Possible": false, "Reason": "Formulas cannot send email."}"#.to_string(),
        )],
        250,
        true,
    )
    .await;

    h.orchestrator.handle(request("conn_b", "email my boss")).await;

    assert_eq!(
        h.registry.sent(),
        vec![(
            ConnectionId::from("conn_b"),
            ServerEvent::invalid_prompt("Formulas cannot send email.")
        )]
    );
    assert_eq!(h.completion.calls().len(), 1);
    assert!(read(&h.training_path).is_empty());
}

#[tokio::test]
async fn successful_generation_appends_one_training_line() {
    let h = harness(
        vec![
            Ok(FEASIBLE.to_string()),
            Ok(r#"{"ExcelFormula": "=IF(A1=\"yes\",1,0)", "GoogleSheetsFormula": "=IF(A1=\"yes\",1,0)"}"#.to_string()),
        ],
        250,
        true,
    )
    .await;

    h.orchestrator
        .handle(request("conn_a", "return 1 when A1 says \"yes\""))
        .await;

    let text = read(&h.training_path);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["prompt"], "return 1 when A1 says \"yes\"");
    let completion = record["completion"].as_str().unwrap();
    assert!(!completion.contains('\n'));
    let solution: Value = serde_json::from_str(completion).unwrap();
    assert_eq!(solution["ExcelFormula"], "=IF(A1=\"yes\",1,0)");
}

#[tokio::test]
async fn training_log_untouched_when_building_data_disabled() {
    let h = harness(vec![Ok(FEASIBLE.to_string()), Ok(SOLUTION.to_string())], 250, false).await;

    h.orchestrator.handle(request("conn_a", "add two numbers")).await;

    assert_eq!(h.registry.sent().len(), 1);
    assert!(!h.training_path.exists());
}

#[tokio::test]
async fn unparseable_verdict_is_silent_and_error_logged() {
    let h = harness(vec![Ok("I think so, yes.".to_string())], 250, true).await;

    h.orchestrator.handle(request("conn_a", "sum column B")).await;

    assert!(h.registry.sent().is_empty());
    assert_eq!(h.completion.calls().len(), 1);
    let log = read(&h.error_path);
    assert!(log.starts_with("------ "));
    assert!(log.contains("feasibility stage parse error"));
    assert!(log.contains("\nsum column B\n"));
    assert!(read(&h.training_path).is_empty());
}

#[tokio::test]
async fn unparseable_solution_is_silent_and_error_logged() {
    let h = harness(
        vec![
            Ok(FEASIBLE.to_string()),
            Ok(r#"{"ExcelFormula": "=SUM(B:B)"}"#.to_string()),
        ],
        250,
        true,
    )
    .await;

    h.orchestrator.handle(request("conn_a", "sum column B")).await;

    assert!(h.registry.sent().is_empty());
    let log = read(&h.error_path);
    assert!(log.contains("generation stage parse error"));
    assert!(log.contains("sum column B"));
    assert!(read(&h.training_path).is_empty());
}

#[tokio::test]
async fn upstream_failure_is_silent_and_error_logged() {
    let h = harness(
        vec![Err(UpstreamError::Status {
            status: 429,
            body: "rate limited".to_string(),
        })],
        250,
        true,
    )
    .await;

    h.orchestrator.handle(request("conn_a", "average of C")).await;

    assert!(h.registry.sent().is_empty());
    let log = read(&h.error_path);
    assert!(log.contains("feasibility stage upstream error"));
    assert!(log.contains("429"));
    assert!(log.contains("average of C"));
}

#[tokio::test]
async fn concurrent_requests_are_each_answered_once() {
    let h = Arc::new(harness_with(ScriptedCompletion::routed(), 250, true).await);

    let a = {
        let h = h.clone();
        tokio::spawn(async move { h.orchestrator.handle(request("conn_a", "one")).await })
    };
    let b = {
        let h = h.clone();
        tokio::spawn(async move { h.orchestrator.handle(request("conn_b", "two")).await })
    };
    a.await.unwrap();
    b.await.unwrap();

    let mut targets: Vec<String> = h
        .registry
        .sent()
        .into_iter()
        .map(|(id, _)| id.to_string())
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["conn_a", "conn_b"]);
    assert_eq!(h.completion.calls().len(), 4);
    assert_eq!(read(&h.training_path).lines().count(), 2);
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn failing_handle_future_is_send() {
    let h = harness(vec![], 250, true).await;

    let fut = h.orchestrator.handle(request("conn_a", "sum column D"));
    assert_send(&fut);
    fut.await;

    assert!(h.registry.sent().is_empty());
    assert!(read(&h.error_path).contains("feasibility stage upstream error"));
}
