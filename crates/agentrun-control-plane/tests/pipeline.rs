//! The whole server in one process: HTTP API, worker pool, event subscriber
//! and webhook delivery, driven by a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentrun_broker::MemoryBroker;
use agentrun_control_plane::webhook::{sign, SIGNATURE_HEADER, WEBHOOK_ID_HEADER};
use agentrun_control_plane::{
    http, AppState, EventSubscriber, RelayConfig, SubscriberConfig, WebhookConfig,
    WebhookDispatcher,
};
use agentrun_llm::{ContentBlock, LlmError, MessageRequest, MessageResponse, ModelClient, StopReason, Usage};
use agentrun_store::{InMemoryTaskRunRepository, InMemoryWebhookRepository};
use agentrun_worker::{AgentConfig, AgentLoop, CancellationRegistry, TaskExecutor, WorkerConfig, WorkerPool};
use async_trait::async_trait;
use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

/// Serves queued responses in order.
#[derive(Default)]
struct ScriptedModel {
    script: Mutex<VecDeque<MessageResponse>>,
}

impl ScriptedModel {
    fn new(script: Vec<MessageResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn create_message(&self, _request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Decode("script exhausted".to_string()))
    }
}

fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> MessageResponse {
    MessageResponse {
        id: "msg".to_string(),
        model: "test-model".to_string(),
        content,
        stop_reason: Some(stop_reason),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

fn tool_use(name: &str, input: Value) -> MessageResponse {
    response(
        vec![ContentBlock::ToolUse {
            id: format!("toolu_{name}"),
            name: name.to_string(),
            input,
        }],
        StopReason::ToolUse,
    )
}

fn end_turn(text: &str) -> MessageResponse {
    response(vec![ContentBlock::text(text)], StopReason::EndTurn)
}

/// A webhook endpoint recording every delivery.
struct Receiver {
    url: String,
    deliveries: mpsc::UnboundedReceiver<(HeaderMap, Bytes)>,
}

impl Receiver {
    async fn start() -> Self {
        let (tx, deliveries) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(tx): State<mpsc::UnboundedSender<(HeaderMap, Bytes)>>,
                     headers: HeaderMap,
                     body: Bytes| async move {
                        tx.send((headers, body)).ok();
                        "ok"
                    },
                ),
            )
            .with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self {
            url: format!("http://{addr}/hook"),
            deliveries,
        }
    }

    async fn next(&mut self) -> (HeaderMap, Bytes) {
        tokio::time::timeout(WAIT, self.deliveries.recv())
            .await
            .expect("no webhook delivery")
            .unwrap()
    }
}

struct Server {
    base: String,
    client: reqwest::Client,
    shutdown: CancellationToken,
    pool: WorkerPool,
    _dir: tempfile::TempDir,
}

impl Server {
    async fn start(model: Arc<ScriptedModel>, workers: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        let runs = Arc::new(InMemoryTaskRunRepository::new());
        let webhooks = Arc::new(InMemoryWebhookRepository::new());
        let cancellations = Arc::new(CancellationRegistry::new());

        let worker_config = WorkerConfig {
            data_dir: dir.path().to_path_buf(),
            block_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let agent = AgentLoop::new(model, AgentConfig::default())
            .with_human_input_timeout(WAIT);
        let executor = Arc::new(TaskExecutor::new(
            broker.clone(),
            runs.clone(),
            agent,
            dir.path(),
        ));
        let pool = WorkerPool::spawn(
            workers,
            worker_config,
            broker.clone(),
            runs.clone(),
            executor,
            cancellations.clone(),
        );

        let dispatcher =
            Arc::new(WebhookDispatcher::new(webhooks.clone(), WebhookConfig::default()).unwrap());
        let subscriber = EventSubscriber::new(
            broker.clone(),
            runs.clone(),
            dispatcher.clone(),
            SubscriberConfig {
                poll_interval: Duration::from_millis(20),
                tail_block: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let shutdown = CancellationToken::new();
        tokio::spawn(subscriber.run(shutdown.clone()));

        let state = AppState::new(
            broker,
            runs,
            webhooks,
            cancellations,
            dispatcher,
            RelayConfig {
                subscribe_block: Duration::from_millis(50),
                session_budget: WAIT,
                ..Default::default()
            },
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, http::create_router(state))
                .await
                .unwrap()
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown,
            pool,
            _dir: dir,
        }
    }

    async fn stop(self) {
        self.pool.shutdown().await;
        self.shutdown.cancel();
    }

    fn get(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base))
            .header("X-User-Id", user)
    }

    fn post(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .header("X-User-Id", user)
    }

    async fn submit(&self, user: &str, prompt: &str) -> String {
        let response = self
            .post(user, "/v1/tasks/task-1/runs")
            .json(&json!({"agentId": "agent-1", "prompt": prompt}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let run: Value = response.json().await.unwrap();
        assert_eq!(run["status"], "queued");
        run["id"].as_str().unwrap().to_string()
    }

    async fn run(&self, user: &str, run_id: &str) -> Value {
        self.get(user, &format!("/v1/runs/{run_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn wait_for_status(&self, user: &str, run_id: &str, status: &str) -> Value {
        tokio::time::timeout(WAIT, async {
            loop {
                let run = self.run(user, run_id).await;
                if run["status"] == status {
                    return run;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("run {run_id} never reached {status}"))
    }

    async fn events(&self, user: &str, run_id: &str) -> String {
        let response = self
            .get(user, &format!("/v1/runs/{run_id}/events"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.text().await.unwrap()
    }

    async fn create_webhook(&self, user: &str, url: &str, events: Value) -> Value {
        let response = self
            .post(user, "/v1/webhooks")
            .json(&json!({"name": "ci", "url": url, "events": events}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }
}

fn sse_event_names(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
        .collect()
}

#[tokio::test]
async fn test_run_completes_and_notifies_webhooks() {
    let model = ScriptedModel::new(vec![
        tool_use("list_directory", json!({"path": "."})),
        end_turn("All done"),
    ]);
    let server = Server::start(model, 1).await;
    let mut receiver = Receiver::start().await;

    let webhook = server
        .create_webhook("u1", &receiver.url, json!(["task.started", "task.completed"]))
        .await;
    let secret = webhook["secret"].as_str().unwrap().to_string();
    assert_eq!(secret.len(), 64);

    let run_id = server.submit("u1", "list the workspace").await;

    let body = server.events("u1", &run_id).await;
    let names = sse_event_names(&body);
    assert_eq!(names.first(), Some(&"TASK_STARTED"));
    assert_eq!(names.last(), Some(&"TASK_COMPLETED"));
    assert!(names.contains(&"STEP_STARTED"));
    assert!(names.contains(&"STEP_COMPLETED"));
    assert!(body.contains("All done"));

    let run = server.wait_for_status("u1", &run_id, "completed").await;
    assert_eq!(run["result"], "All done");
    assert_eq!(run["progress"], 100);

    for expected in ["task.started", "task.completed"] {
        let (headers, body) = receiver.next().await;
        assert_eq!(
            headers[SIGNATURE_HEADER].to_str().unwrap(),
            sign(&body, &secret).unwrap()
        );
        assert_eq!(
            headers[WEBHOOK_ID_HEADER].to_str().unwrap(),
            webhook["id"].as_str().unwrap()
        );
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["event"], expected);
        assert_eq!(payload["data"]["taskRunId"], run_id.as_str());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_human_input_over_http() {
    let model = ScriptedModel::new(vec![
        tool_use(
            "request_human_input",
            json!({"prompt": "Deploy?", "options": ["yes", "no"]}),
        ),
        end_turn("Deployed"),
    ]);
    let server = Server::start(model, 1).await;
    let run_id = server.submit("u1", "deploy").await;

    server.wait_for_status("u1", &run_id, "waiting_input").await;

    let response = server
        .post("u1", &format!("/v1/runs/{run_id}/input"))
        .json(&json!({"approved": true, "value": "yes"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let run = server.wait_for_status("u1", &run_id, "completed").await;
    assert_eq!(run["result"], "Deployed");

    let body = server.events("u1", &run_id).await;
    assert!(sse_event_names(&body).contains(&"HUMAN_INPUT_NEEDED"));

    // Nothing is waiting any more.
    let response = server
        .post("u1", &format!("/v1/runs/{run_id}/input"))
        .json(&json!({"approved": false, "reason": "too late"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    server.stop().await;
}

#[tokio::test]
async fn test_caller_identity_and_cancellation() {
    // No workers: runs stay queued.
    let server = Server::start(ScriptedModel::new(vec![]), 0).await;
    let run_id = server.submit("u1", "never runs").await;

    let response = server
        .client
        .get(format!("{}/v1/runs/{run_id}", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .get("u2", &format!("/v1/runs/{run_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .post("u2", &format!("/v1/runs/{run_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .post("u1", &format!("/v1/runs/{run_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let run: Value = response.json().await.unwrap();
    assert_eq!(run["status"], "cancelled");

    let response = server
        .post("u1", &format!("/v1/runs/{run_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The cancellation is on the run's stream and the session closes on it.
    let body = server.events("u1", &run_id).await;
    assert_eq!(sse_event_names(&body), vec!["TASK_FAILED"]);
    assert!(body.contains("Task cancelled"));

    server.stop().await;
}

#[tokio::test]
async fn test_event_stream_resumes_after_last_event_id() {
    let model = ScriptedModel::new(vec![end_turn("hi")]);
    let server = Server::start(model, 1).await;
    let run_id = server.submit("u1", "say hi").await;
    server.wait_for_status("u1", &run_id, "completed").await;

    let body = server.events("u1", &run_id).await;
    let first_id = body
        .lines()
        .find_map(|line| line.strip_prefix("id:"))
        .map(str::trim)
        .unwrap()
        .to_string();

    let resumed = server
        .get("u1", &format!("/v1/runs/{run_id}/events"))
        .header("Last-Event-ID", &first_id)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let names = sse_event_names(&resumed);
    assert!(!names.contains(&"TASK_STARTED"));
    assert_eq!(names.last(), Some(&"TASK_COMPLETED"));

    let response = server
        .get("u1", &format!("/v1/runs/{run_id}/events"))
        .header("Last-Event-ID", "not-an-id")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_webhook_management() {
    let server = Server::start(ScriptedModel::new(vec![]), 0).await;
    let receiver = Receiver::start().await;

    let health: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    for body in [
        json!({"name": "bad", "url": "ftp://example.com", "events": ["task.started"]}),
        json!({"name": "bad", "url": "http://example.com", "events": []}),
        json!({"name": "", "url": "http://example.com", "events": ["task.started"]}),
    ] {
        let response = server
            .post("u1", "/v1/webhooks")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let webhook = server
        .create_webhook("u1", &receiver.url, json!(["task.failed"]))
        .await;
    let id = webhook["id"].as_str().unwrap().to_string();

    let listed: Value = server
        .get("u1", "/v1/webhooks")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(listed[0].get("secret").is_none());

    let others: Value = server
        .get("u2", "/v1/webhooks")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(others.as_array().unwrap().is_empty());

    let test: Value = server
        .post("u1", &format!("/v1/webhooks/{id}/test"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(test, json!({"success": true, "status": 200}));

    let test: Value = server
        .post("u2", &format!("/v1/webhooks/{id}/test"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(test, json!({"success": false, "error": "Webhook not found"}));

    let updated: Value = server
        .client
        .patch(format!("{}/v1/webhooks/{id}", server.base))
        .header("X-User-Id", "u1")
        .json(&json!({"enabled": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["enabled"], false);

    let delete = |user: &'static str| {
        server
            .client
            .delete(format!("{}/v1/webhooks/{id}", server.base))
            .header("X-User-Id", user)
            .send()
    };
    assert_eq!(delete("u2").await.unwrap().status(), StatusCode::NOT_FOUND);
    assert_eq!(delete("u1").await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(delete("u1").await.unwrap().status(), StatusCode::NOT_FOUND);

    let metrics = server
        .client
        .get(format!("{}/metrics", server.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("agentrun_webhooks{state=\"enabled\"} 0"));

    server.stop().await;
}
