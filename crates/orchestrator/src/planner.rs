//! Deterministic scan planning.
//!
//! The plan is a pure function of the subject: the same subject always
//! yields the same plan, so a worker that lost its checkpoint can replan
//! and land on identical phases.

use agents::BUDGET_QUESTION_ID;
use leadlens_core::{AgentSpec, PhasePlan, QuestionSpec, ScanPlan, ScanSubject};

pub const PHASE_DISCOVERY: &str = "discovery";
pub const PHASE_SITE_AUDIT: &str = "site_audit";
pub const PHASE_ESTIMATE: &str = "estimate";

pub fn build_plan(subject: &ScanSubject) -> ScanPlan {
    let mut phases = vec![PhasePlan {
        name: PHASE_DISCOVERY.to_string(),
        agents: vec![AgentSpec::required("tech_stack")],
        question: None,
    }];

    if subject.website_url.is_some() {
        phases.push(PhasePlan {
            name: PHASE_SITE_AUDIT.to_string(),
            agents: vec![
                AgentSpec::required("performance"),
                AgentSpec::optional("accessibility"),
            ],
            question: None,
        });
    }

    // Without a budget hint the pipeline pauses before estimating: the
    // question is attached to whatever phase precedes the estimate.
    if subject.budget_hint.is_none() {
        if let Some(last) = phases.last_mut() {
            last.question = Some(QuestionSpec {
                id: BUDGET_QUESTION_ID.to_string(),
                prompt: format!(
                    "What budget range should the {} opportunity be scoped against?",
                    subject.company_name
                ),
            });
        }
    }

    phases.push(PhasePlan {
        name: PHASE_ESTIMATE.to_string(),
        agents: vec![AgentSpec::required("budget")],
        question: None,
    });

    ScanPlan { phases }
}
