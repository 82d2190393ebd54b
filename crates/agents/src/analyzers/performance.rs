use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentFailure;
use crate::model::ModelClient;
use crate::runner::{clamp_confidence, map_model_error, AgentContext, AgentReport, ScanAgent};

/// Audits the performance of the prospect's website. Reads the tech-stack
/// result from an earlier phase when available.
pub struct PerformanceAgent;

#[derive(Debug, Deserialize)]
struct PerformanceFinding {
    score: i64,
    issues: Vec<String>,
    confidence: i64,
}

#[async_trait]
impl ScanAgent for PerformanceAgent {
    fn name(&self) -> &'static str {
        "performance"
    }

    async fn analyze(
        &self,
        client: &dyn ModelClient,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure> {
        let website = ctx.subject.website_url.as_deref().unwrap_or("(none)");
        let stack_hint = ctx
            .result_of("tech_stack")
            .map(|r| r.output.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let prompt = format!(
            "Audit the load performance of {website}. Known stack: {stack_hint}. \
             Report a 0-100 score and the main issues."
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "score": {"type": "integer", "minimum": 0, "maximum": 100},
                "issues": {"type": "array", "items": {"type": "string"}},
                "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["score", "issues", "confidence"]
        });

        let output = client
            .complete_structured(&prompt, &schema)
            .await
            .map_err(map_model_error)?;
        let finding: PerformanceFinding = serde_json::from_value(output.clone())
            .map_err(|e| AgentFailure::SchemaViolation(e.to_string()))?;

        tracing::debug!(score = finding.score, issues = finding.issues.len(), "Performance audited");

        Ok(AgentReport {
            output,
            confidence: clamp_confidence(finding.confidence),
        })
    }
}
