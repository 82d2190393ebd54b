use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadlens_core::{AgentRecord, ScanSubject};
use serde_json::Value;

use crate::error::AgentFailure;
use crate::model::{ModelClient, ModelError};

/// Everything an agent may look at: the subject, answers collected at
/// interrogatory checkpoints, and results from earlier phases.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub subject: ScanSubject,
    pub answers: HashMap<String, String>,
    pub prior_results: HashMap<String, HashMap<String, AgentRecord>>,
}

impl AgentContext {
    /// Look up a prior result by agent name across all phases.
    pub fn result_of(&self, agent: &str) -> Option<&AgentRecord> {
        self.prior_results.values().find_map(|phase| phase.get(agent))
    }
}

/// Result of one successful agent execution.
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub output: Value,
    pub confidence: u8,
}

/// One unit of analysis work. Implementations build a prompt, call the
/// model seam, and validate the structured output into their typed shape.
#[async_trait]
pub trait ScanAgent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        client: &dyn ModelClient,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure>;
}

/// Executes agents with an enforced wall-clock timeout.
///
/// The underlying model call is not trusted to self-limit; a blown deadline
/// is reported as `AgentFailure::Timeout`, distinct from transport and
/// schema failures, so the orchestrator can tell them apart.
#[derive(Clone)]
pub struct AgentRunner {
    client: Arc<dyn ModelClient>,
    timeout: Duration,
}

impl AgentRunner {
    pub fn new(client: Arc<dyn ModelClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn run(
        &self,
        agent: &dyn ScanAgent,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure> {
        match tokio::time::timeout(self.timeout, agent.analyze(self.client.as_ref(), ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AgentFailure::Timeout(self.timeout)),
        }
    }
}

pub(crate) fn map_model_error(e: ModelError) -> AgentFailure {
    match e {
        ModelError::Transport(msg) => AgentFailure::Transport(msg),
        ModelError::InvalidResponse(msg) => AgentFailure::Transport(msg),
    }
}

/// Clamp a model-reported confidence into the 0-100 range.
pub(crate) fn clamp_confidence(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient;

    #[async_trait]
    impl ModelClient for SlowClient {
        async fn complete_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
        ) -> Result<Value, ModelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    struct EchoAgent;

    #[async_trait]
    impl ScanAgent for EchoAgent {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn analyze(
            &self,
            client: &dyn ModelClient,
            _ctx: &AgentContext,
        ) -> Result<AgentReport, AgentFailure> {
            let output = client
                .complete_structured("echo", &Value::Null)
                .await
                .map_err(map_model_error)?;
            Ok(AgentReport {
                output,
                confidence: 50,
            })
        }
    }

    fn ctx() -> AgentContext {
        AgentContext {
            subject: ScanSubject {
                case_id: "case-1".to_string(),
                company_name: "Acme".to_string(),
                website_url: None,
                industry: None,
                employee_count: None,
                budget_hint: None,
            },
            answers: HashMap::new(),
            prior_results: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_enforced() {
        let runner = AgentRunner::new(Arc::new(SlowClient), Duration::from_millis(100));

        let result = runner.run(&EchoAgent, &ctx()).await;
        match result {
            Err(AgentFailure::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fast_agent_passes_through() {
        struct FastClient;

        #[async_trait]
        impl ModelClient for FastClient {
            async fn complete_structured(
                &self,
                _prompt: &str,
                _schema: &Value,
            ) -> Result<Value, ModelError> {
                Ok(serde_json::json!({"ok": true}))
            }
        }

        let runner = AgentRunner::new(Arc::new(FastClient), Duration::from_secs(5));
        let report = runner.run(&EchoAgent, &ctx()).await.unwrap();
        assert_eq!(report.output["ok"], true);
        assert_eq!(report.confidence, 50);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(-5), 0);
        assert_eq!(clamp_confidence(55), 55);
        assert_eq!(clamp_confidence(400), 100);
    }
}
