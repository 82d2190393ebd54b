//! End-to-end orchestration tests against a real SQLite store and a
//! scripted model client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agents::{AgentRegistry, AgentRunner, ModelClient, ModelError};
use async_trait::async_trait;
use db::{create_pool, run_migrations, RunRepository};
use events::{ProgressBus, ScanEvent};
use leadlens_core::{Checkpoint, RunStatus, ScanSubject};
use orchestrator::{
    build_plan, OrchestratorConfig, OrchestratorError, ScanOrchestrator, ScanService,
    PHASE_SITE_AUDIT,
};
use queue::{JobQueue, QueueConfig};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Model client scripted per agent: counts calls and can stall the first N
/// calls of an agent past the runner's timeout.
struct ScriptedClient {
    calls: Mutex<HashMap<&'static str, u32>>,
    stall_first: HashMap<&'static str, u32>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            stall_first: HashMap::new(),
        }
    }

    fn stalling(agent: &'static str, times: u32) -> Self {
        let mut client = Self::new();
        client.stall_first.insert(agent, times);
        client
    }

    async fn calls_for(&self, agent: &str) -> u32 {
        self.calls.lock().await.get(agent).copied().unwrap_or(0)
    }

    fn agent_for_prompt(prompt: &str) -> &'static str {
        if prompt.contains("technology stack") {
            "tech_stack"
        } else if prompt.contains("load performance") {
            "performance"
        } else if prompt.contains("accessibility problems") {
            "accessibility"
        } else if prompt.contains("project budget") {
            "budget"
        } else {
            panic!("unrecognized prompt: {prompt}");
        }
    }

    fn canned_output(agent: &str) -> Value {
        match agent {
            "tech_stack" => json!({
                "technologies": ["wordpress", "jquery"],
                "hosting": "shared",
                "confidence": 70
            }),
            "performance" => json!({"score": 40, "issues": ["no caching"], "confidence": 85}),
            "accessibility" => json!({"violations": [], "wcag_level": "AA", "confidence": 90}),
            "budget" => json!({
                "estimate_low": 10000,
                "estimate_high": 30000,
                "rationale": "CMS rebuild",
                "confidence": 75
            }),
            other => panic!("no canned output for {other}"),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete_structured(&self, prompt: &str, _schema: &Value) -> Result<Value, ModelError> {
        let agent = Self::agent_for_prompt(prompt);
        let call = {
            let mut calls = self.calls.lock().await;
            let entry = calls.entry(agent).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(&stalls) = self.stall_first.get(agent) {
            if call <= stalls {
                // Outlive the runner's timeout; the attempt is cancelled.
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        Ok(Self::canned_output(agent))
    }
}

struct Harness {
    repo: RunRepository,
    queue: JobQueue,
    bus: ProgressBus,
    service: ScanService,
    orchestrator: ScanOrchestrator,
    client: Arc<ScriptedClient>,
    _dir: tempfile::TempDir,
}

async fn harness(client: ScriptedClient) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = RunRepository::new(pool.clone());
    let queue = JobQueue::new(pool, QueueConfig::default());
    let bus = ProgressBus::new();
    let client = Arc::new(client);
    let runner = AgentRunner::new(client.clone(), Duration::from_millis(100));
    let orchestrator = ScanOrchestrator::new(
        repo.clone(),
        bus.clone(),
        runner,
        AgentRegistry::standard(),
        OrchestratorConfig {
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        },
    );
    let service = ScanService::new(repo.clone(), queue.clone(), bus.clone());

    Harness {
        repo,
        queue,
        bus,
        service,
        orchestrator,
        client,
        _dir: dir,
    }
}

fn subject_with_budget() -> ScanSubject {
    ScanSubject {
        case_id: "case-1".to_string(),
        company_name: "Acme".to_string(),
        website_url: Some("https://acme.example".to_string()),
        industry: Some("retail".to_string()),
        employee_count: Some(120),
        budget_hint: Some("10-50k".to_string()),
    }
}

fn subject_without_budget() -> ScanSubject {
    ScanSubject {
        budget_hint: None,
        ..subject_with_budget()
    }
}

#[tokio::test]
async fn scenario_all_agents_succeed() {
    let h = harness(ScriptedClient::new()).await;
    let mut rx = h.bus.subscribe();

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 100);
    assert!(run.completed_at.is_some());
    assert_eq!(run.completed_agents.len(), 4);
    assert!(run.failed_agents.is_empty());

    // Average confidence is obtainable from the confidence map.
    let sum: u32 = run.agent_confidences.values().map(|&c| c as u32).sum();
    assert_eq!(sum / run.agent_confidences.len() as u32, 80);

    // Event stream: starts with the first phase, ends terminally, and
    // per-run sequence numbers arrive strictly increasing.
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope);
    }
    assert!(matches!(
        events.first().map(|e| &e.event),
        Some(ScanEvent::PhaseStarted { phase, .. }) if phase == "discovery"
    ));
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(ScanEvent::RunCompleted)
    ));
    let mut last_seq = 0;
    for envelope in &events {
        assert!(envelope.seq > last_seq);
        last_seq = envelope.seq;
    }
}

#[tokio::test]
async fn scenario_timeout_twice_then_succeed() {
    let h = harness(ScriptedClient::stalling("performance", 2)).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    // Attempt 3 succeeded: the earlier failures were cleared.
    assert!(run.completed_agents.contains(&"performance".to_string()));
    assert!(run.failed_agents.is_empty());
    assert_eq!(h.client.calls_for("performance").await, 3);
}

#[tokio::test]
async fn scenario_required_agent_exhausts_attempts() {
    let h = harness(ScriptedClient::stalling("tech_stack", u32::MAX)).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failed_agents, vec!["tech_stack"]);
    let reason = run.failure_reason.unwrap();
    assert!(reason.contains("discovery"), "unexpected reason: {reason}");
    assert_eq!(h.client.calls_for("tech_stack").await, 3);
}

#[tokio::test]
async fn scenario_pending_question_pause_and_answer() {
    let h = harness(ScriptedClient::new()).await;

    let run = h.service.trigger(subject_without_budget()).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();

    let paused = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(paused.status, RunStatus::WaitingForUser);
    let snapshot = h.service.snapshot(run.id).await.unwrap();
    assert_eq!(
        snapshot.pending_question.as_ref().map(|q| q.id.as_str()),
        Some("budget_range")
    );
    // The estimate phase has not run yet.
    assert_eq!(h.client.calls_for("budget").await, 0);

    // Malformed run id.
    let err = h
        .service
        .answer(Uuid::new_v4(), "25-50k".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::RunNotFound(_)));

    // The waiting run still counts as active for its subject.
    let other = h.service.trigger(subject_with_budget()).await.unwrap_err();
    assert!(matches!(other, OrchestratorError::AlreadyRunning(_)));

    h.service.answer(run.id, "25-50k".to_string()).await.unwrap();

    // Answer cleared the question and re-enqueued the run.
    let resumed = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(resumed.status, RunStatus::Running);
    let counts = h.queue.counts().await.unwrap();
    assert!(counts.iter().any(|(status, n)| status == "queued" && *n >= 1));

    // Answering again: no longer waiting.
    let err = h
        .service
        .answer(run.id, "again".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotWaiting(_)));

    // Resumed execution finishes the estimate phase.
    h.orchestrator.execute(run.id).await.unwrap();
    let done = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(h.client.calls_for("budget").await, 1);
}

#[tokio::test]
async fn scenario_crash_recovery_runs_only_unresolved_agents() {
    let h = harness(ScriptedClient::new()).await;

    // Simulated crash state: discovery done, 2 of 3 remaining agents merged,
    // checkpoint saved at the audit phase before the crash.
    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    let subject = subject_with_budget();
    let checkpoint = Checkpoint::new(subject.clone(), build_plan(&subject), PHASE_SITE_AUDIT);
    h.repo.save_checkpoint(run.id, &checkpoint).await.unwrap();
    h.repo.merge_agent_complete(run.id, "tech_stack", 70).await.unwrap();
    h.repo.merge_agent_complete(run.id, "performance", 85).await.unwrap();

    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.completed_agents.len(), 4);
    // Already-merged agents were not re-run.
    assert_eq!(h.client.calls_for("tech_stack").await, 0);
    assert_eq!(h.client.calls_for("performance").await, 0);
    assert_eq!(h.client.calls_for("accessibility").await, 1);
    assert_eq!(h.client.calls_for("budget").await, 1);
}

#[tokio::test]
async fn scenario_corrupt_checkpoint_replans_without_reruns() {
    let h = harness(ScriptedClient::new()).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.repo.merge_agent_complete(run.id, "tech_stack", 70).await.unwrap();
    sqlx::query("UPDATE runs SET checkpoint = 'garbage' WHERE id = ?")
        .bind(run.id.to_string())
        .execute(h.repo.pool())
        .await
        .unwrap();

    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    // The durable agent set survived the lost checkpoint.
    assert_eq!(h.client.calls_for("tech_stack").await, 0);
    assert_eq!(h.client.calls_for("performance").await, 1);
}

#[tokio::test]
async fn idempotence_completed_run_is_not_reexecuted() {
    let h = harness(ScriptedClient::new()).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();
    h.orchestrator.execute(run.id).await.unwrap();

    for agent in ["tech_stack", "performance", "accessibility", "budget"] {
        assert_eq!(h.client.calls_for(agent).await, 1, "agent {agent} re-ran");
    }
}

#[tokio::test]
async fn cancelled_run_discards_late_merges() {
    let h = harness(ScriptedClient::new()).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    h.service.cancel(run.id).await.unwrap();

    // The worker picks the job up anyway: execution refuses to start and
    // nothing changes on the row.
    h.orchestrator.execute(run.id).await.unwrap();

    let run = h.repo.find_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.completed_agents.is_empty());
    assert_eq!(h.client.calls_for("tech_stack").await, 0);

    // Cancelling twice is an invalid transition.
    let err = h.service.cancel(run.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
}

#[tokio::test]
async fn trigger_validates_subject() {
    let h = harness(ScriptedClient::new()).await;

    let mut subject = subject_with_budget();
    subject.company_name = String::new();

    let err = h.service.trigger(subject).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert!(h.service.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_cancels_then_removes() {
    let h = harness(ScriptedClient::new()).await;

    let run = h.service.trigger(subject_with_budget()).await.unwrap();
    assert!(h.service.delete(run.id).await.unwrap());

    assert!(h.repo.find_by_id(run.id).await.unwrap().is_none());
    let counts = h.queue.counts().await.unwrap();
    assert!(counts.is_empty());
    assert!(!h.service.delete(run.id).await.unwrap());
}
