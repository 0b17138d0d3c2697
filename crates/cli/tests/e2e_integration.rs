//! End-to-end tests: scripted LLM, real tools, real SQLite run store,
//! driven through both the run executor and the HTTP router.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use orchestrator_agent::AgentLoop;
use orchestrator_config::AppConfig;
use orchestrator_core::error::ProviderError;
use orchestrator_core::message::{Message, MessageToolCall};
use orchestrator_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice};
use orchestrator_core::run::{RunStatus, StepKind};
use orchestrator_gateway::{AppState, RunRequest, SharedState, build_router};
use orchestrator_memory::{InMemoryBackend, KnowledgeBase};
use orchestrator_store::{SqliteStore, Store};
use orchestrator_tools::default_catalog;
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replays scripted turns in order and keeps every request it saw.
struct ScriptedProvider {
    turns: Mutex<VecDeque<Result<Message, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<Result<Message, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted"));
        Ok(ProviderResponse {
            message: turn?,
            usage: None,
            model: "mock-model".into(),
        })
    }
}

fn tool_turn(name: &str, arguments: &str) -> Message {
    Message::assistant_with_tool_calls(
        "",
        vec![MessageToolCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: arguments.into(),
        }],
    )
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    state: SharedState,
    config: AppConfig,
    _dir: tempfile::TempDir,
}

async fn harness(provider: Arc<ScriptedProvider>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.tools.files_dir = dir.path().join("files");

    let kb = Arc::new(KnowledgeBase::new(Arc::new(InMemoryBackend::new())));
    let tools = default_catalog(&config, kb).unwrap();
    let agent = AgentLoop::new(provider, Arc::new(tools));
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let state = Arc::new(AppState::new(agent, store, &config));

    Harness {
        state,
        config,
        _dir: dir,
    }
}

async fn call(
    h: &Harness,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = build_router(h.state.clone(), &h.config.gateway)
        .oneshot(req)
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn calculator_run_is_persisted_step_by_step() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_turn("calculator", r#"{"operation":"add","x":2,"y":2}"#)),
        Ok(Message::assistant("2 + 2 equals 4.")),
    ]);
    let h = harness(provider.clone()).await;

    let outcome = h
        .state
        .execute(RunRequest {
            goal: "what is 2+2".into(),
            tools: Some(vec!["calculator".into()]),
            ..RunRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(outcome.answer.unwrap(), "2 + 2 equals 4.");

    let run = h.state.store.get_run(&outcome.run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
    let kinds: Vec<StepKind> = run.steps.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::UserRequest,
            StepKind::AgentThought,
            StepKind::ToolCall,
            StepKind::ToolResult,
            StepKind::AgentResponse,
        ]
    );
    assert!(run.steps.iter().enumerate().all(|(i, s)| s.order == i as u32));
    assert_eq!(run.steps[3].result(), Some("2 + 2 = 4"));
    assert_eq!(run.final_response(), Some("2 + 2 equals 4."));

    let requests = provider.requests();
    assert_eq!(requests[0].tool_choice, ToolChoice::Required);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
}

#[tokio::test]
async fn file_io_writes_inside_the_sandbox() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_turn(
            "file_io",
            r#"{"operation":"write","filename":"notes.txt","content":"hello"}"#,
        )),
        Ok(Message::assistant("Saved.")),
    ]);
    let h = harness(provider).await;

    let outcome = h
        .state
        .execute(RunRequest {
            goal: "save a note".into(),
            tools: Some(vec!["auto".into()]),
            ..RunRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(outcome.answer.unwrap(), "Saved.");

    let written = std::fs::read_to_string(h.config.tools.files_dir.join("notes.txt")).unwrap();
    assert_eq!(written, "hello");
    assert_eq!(
        outcome.run.steps[3].result(),
        Some("Successfully wrote 5 characters to 'notes.txt'")
    );
}

#[tokio::test]
async fn remember_then_recall_through_the_agent() {
    let docs = tempfile::tempdir().unwrap();
    let doc = docs.path().join("launch.md");
    std::fs::write(&doc, "# Launch\n\nThe launch code is PINEAPPLE.\n").unwrap();
    let remember_args = serde_json::json!({ "file_path": doc.to_string_lossy() }).to_string();

    let provider = ScriptedProvider::new(vec![
        Ok(tool_turn("remember_file", &remember_args)),
        Ok(Message::assistant("Remembered.")),
        Ok(tool_turn("recall_memory", r#"{"query":"launch code"}"#)),
        Ok(Message::assistant("The launch code is PINEAPPLE.")),
    ]);
    let h = harness(provider).await;

    let first = h
        .state
        .execute(RunRequest {
            goal: "remember the launch doc".into(),
            tools: Some(vec!["remember_file".into()]),
            ..RunRequest::default()
        })
        .await
        .unwrap();
    let stored = first.run.steps[3].result().unwrap();
    assert!(stored.starts_with("Successfully added"), "{stored}");

    let second = h
        .state
        .execute(RunRequest {
            goal: "what is the launch code?".into(),
            tools: Some(vec!["recall_memory".into()]),
            ..RunRequest::default()
        })
        .await
        .unwrap();
    let recalled = second.run.steps[3].result().unwrap();
    assert!(recalled.contains("PINEAPPLE"), "{recalled}");
    assert!(recalled.contains("[Source:"));
}

#[tokio::test]
async fn http_chat_then_browse_history() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_turn("calculator", r#"{"operation":"multiply","x":6,"y":7}"#)),
        Ok(Message::assistant("42")),
    ]);
    let h = harness(provider).await;

    let (status, body) = call(
        &h,
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "6 times 7", "tools": ["calculator"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "42");
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, list) = call(&h, "GET", "/api/runs", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], run_id.as_str());
    assert_eq!(items[0]["status"], "Completed");
    assert_eq!(items[0]["name"], format!("Run {}", &run_id[..8]));

    let (status, detail) = call(&h, "GET", &format!("/api/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let steps = detail["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[2]["type"], "tool-call");
    assert_eq!(steps[3]["content"]["result"], "6 * 7 = 42");

    let (status, _) = call(&h, "DELETE", &format!("/api/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&h, "GET", &format!("/api/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_tool_is_withheld_from_auto_runs() {
    let provider = ScriptedProvider::new(vec![Ok(Message::assistant("no search today"))]);
    let h = harness(provider.clone()).await;

    let (status, tool) = call(
        &h,
        "PUT",
        "/api/tools/web_search",
        Some(serde_json::json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tool["enabled"], false);

    let (_, stats) = call(&h, "GET", "/api/tools/stats/summary", None).await;
    assert_eq!(stats["total_available"], 5);
    assert_eq!(stats["disabled"], 1);
    assert_eq!(stats["enabled"], 4);

    let (status, _) = call(
        &h,
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "search the web", "tools": ["auto"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let offered: Vec<String> = provider.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(offered.len(), 4);
    assert!(!offered.iter().any(|n| n == "web_search"));
}

#[tokio::test]
async fn provider_failure_is_recorded_as_failed_run() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::ApiError {
        status_code: 503,
        message: "overloaded".into(),
    })]);
    let h = harness(provider).await;

    let (status, body) = call(
        &h,
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Agent execution failed:")
    );

    let (_, stats) = call(&h, "GET", "/api/runs/stats/summary", None).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["failed"], 1);
}
