use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AgentFailure;
use crate::model::ModelClient;
use crate::runner::{clamp_confidence, map_model_error, AgentContext, AgentReport, ScanAgent};

/// Detects the technologies behind the prospect's web presence.
pub struct TechStackAgent;

#[derive(Debug, Deserialize)]
struct TechStackFinding {
    technologies: Vec<String>,
    #[serde(default)]
    hosting: Option<String>,
    confidence: i64,
}

#[async_trait]
impl ScanAgent for TechStackAgent {
    fn name(&self) -> &'static str {
        "tech_stack"
    }

    async fn analyze(
        &self,
        client: &dyn ModelClient,
        ctx: &AgentContext,
    ) -> Result<AgentReport, AgentFailure> {
        let website = ctx.subject.website_url.as_deref().unwrap_or("(none)");
        let prompt = format!(
            "Identify the technology stack of {company} (website: {website}). \
             List detectable frameworks, CMS, analytics and hosting.",
            company = ctx.subject.company_name,
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "technologies": {"type": "array", "items": {"type": "string"}},
                "hosting": {"type": ["string", "null"]},
                "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["technologies", "confidence"]
        });

        let output = client
            .complete_structured(&prompt, &schema)
            .await
            .map_err(map_model_error)?;
        let finding: TechStackFinding = serde_json::from_value(output.clone())
            .map_err(|e| AgentFailure::SchemaViolation(e.to_string()))?;

        tracing::debug!(
            technologies = finding.technologies.len(),
            hosting = ?finding.hosting,
            "Tech stack detected"
        );

        Ok(AgentReport {
            output,
            confidence: clamp_confidence(finding.confidence),
        })
    }
}
