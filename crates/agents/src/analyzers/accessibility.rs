use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentFailure;
use crate::model::ModelClient;
use crate::runner::{clamp_confidence, map_model_error, AgentContext, AgentReport, ScanAgent};

/// Audits the prospect's website against WCAG accessibility criteria.
pub struct AccessibilityAgent;

#[derive(Debug, Deserialize)]
struct AccessibilityFinding {
    violations: Vec<String>,
    #[serde(default)]
    wcag_level: Option<String>,
    confidence: i64,
}

#[async_trait]
impl ScanAgent for AccessibilityAgent {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    async fn analyze(
        &self,
        client: &dyn ModelClient,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure> {
        let website = ctx.subject.website_url.as_deref().unwrap_or("(none)");
        let prompt = format!(
            "Audit {website} for accessibility problems. Report WCAG violations \
             and the conformance level currently met, if any."
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "violations": {"type": "array", "items": {"type": "string"}},
                "wcag_level": {"type": ["string", "null"]},
                "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["violations", "confidence"]
        });

        let output = client
            .complete_structured(&prompt, &schema)
            .await
            .map_err(map_model_error)?;
        let finding: AccessibilityFinding = serde_json::from_value(output.clone())
            .map_err(|e| AgentFailure::SchemaViolation(e.to_string()))?;

        tracing::debug!(violations = finding.violations.len(), "Accessibility audited");

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
            "violations": ["missing alt text", "low contrast"],
            "wcag_level": null,
            "confidence": 64
        }));

        let report = AccessibilityAgent
            .analyze(&client, &ctx_with_website())
            .await
            .unwrap();
        assert_eq!(report.confidence, 64);
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let client = StaticClient(json!({"violations": [], "confidence": 250}));

        let report = AccessibilityAgent
            .analyze(&client, &ctx_with_website())
            .await
            .unwrap();
        assert_eq!(report.confidence, 100);
    }
}
