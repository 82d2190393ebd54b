use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentFailure;
use crate::model::ModelClient;
use crate::runner::{clamp_confidence, map_model_error, AgentContext, AgentReport, ScanAgent};

/// Question id whose answer supplies the budget range when the subject
/// carries no hint. Must match the planner's interrogatory checkpoint.
pub const BUDGET_QUESTION_ID: &str = "budget_range";

/// Estimates the engagement budget from everything the earlier phases found.
pub struct BudgetAgent;

#[derive(Debug, Deserialize)]
struct BudgetFinding {
    estimate_low: i64,
    estimate_high: i64,
    #[serde(default)]
    rationale: Option<String>,
    confidence: i64,
}

#[async_trait]
impl ScanAgent for BudgetAgent {
    fn name(&self) -> &'static str {
        "budget"
    }

    async fn analyze(
        &self,
        client: &dyn ModelClient,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure> {
        let budget_range = ctx
            .subject
            .budget_hint
            .clone()
            .or_else(|| ctx.answers.get(BUDGET_QUESTION_ID).cloned())
            .unwrap_or_else(|| "unspecified".to_string());
        let findings: Vec<String> = ctx
            .prior_results
            .values()
            .flat_map(|phase| phase.iter())
            .map(|(agent, record)| format!("{agent}: {}", record.output))
            .collect();

        let prompt = format!(
            "Estimate a project budget for {company} (headcount: {headcount}). \
             Stated budget range: {budget_range}. Prior findings: {findings}",
            company = ctx.subject.company_name,
            headcount = ctx
                .subject
                .employee_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            findings = findings.join("; "),
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "estimate_low": {"type": "integer"},
                "estimate_high": {"type": "integer"},
                "rationale": {"type": ["string", "null"]},
                "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["estimate_low", "estimate_high", "confidence"]
        });

        let output = client
            .complete_structured(&prompt, &schema)
            .await
            .map_err(map_model_error)?;
        let finding: BudgetFinding = serde_json::from_value(output.clone())
            .map_err(|e| AgentFailure::SchemaViolation(e.to_string()))?;

        if finding.estimate_low > finding.estimate_high {
            return Err(AgentFailure::SchemaViolation(format!(
                "estimate_low {} exceeds estimate_high {}",
                finding.estimate_low, finding.estimate_high
            )));
        }

        tracing::debug!(
            low = finding.estimate_low,
            high = finding.estimate_high,
            rationale = ?finding.rationale,
            "Budget estimated"
        );

        Ok(AgentReport {
            output,
            confidence: clamp_confidence(finding.confidence),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::tests::{ctx_with_website, StaticClient};

    #[tokio::test]
    async fn test_valid_output() {
        let client = StaticClient(json!({
            "estimate_low": 10000,
            "estimate_high": 45000,
            "rationale": "legacy CMS rebuild",
            "confidence": 58
        }));

        let report = BudgetAgent
            .analyze(&client, &ctx_with_website())
            .await
            .unwrap();
        assert_eq!(report.confidence, 58);
        assert_eq!(report.output["estimate_high"], 45000);
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let client = StaticClient(json!({
            "estimate_low": 50000,
            "estimate_high": 10000,
            "confidence": 58
        }));

        let err = BudgetAgent
            .analyze(&client, &ctx_with_website())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentFailure::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_answer_feeds_budget_range() {
        let mut ctx = ctx_with_website();
        ctx.answers
            .insert(BUDGET_QUESTION_ID.to_string(), "25-50k".to_string());

        let client = StaticClient(json!({
            "estimate_low": 25000,
            "estimate_high": 50000,
            "confidence": 80
        }));
        let report = BudgetAgent.analyze(&client, &ctx).await.unwrap();
        assert_eq!(report.confidence, 80);
    }
}
