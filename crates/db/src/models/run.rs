use chrono::{DateTime, TimeZone, Utc};
use leadlens_core::{Run, RunStatus, ScanSubject};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: String,
    pub subject_id: String,
    pub subject: String,
    pub status: String,
    pub phase: Option<String>,
    pub progress: i64,
    pub completed_agents: String,
    pub failed_agents: String,
    pub agent_confidences: String,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl RunRow {
    pub fn into_domain(self) -> Run {
        Run {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            subject_id: self.subject_id,
            subject: serde_json::from_str(&self.subject).unwrap_or_else(|_| ScanSubject {
                case_id: String::new(),
                company_name: String::new(),
                website_url: None,
                industry: None,
                employee_count: None,
                budget_hint: None,
            }),
            status: RunStatus::parse(&self.status).unwrap_or_default(),
            phase: self.phase,
            progress: self.progress.clamp(0, 100) as u8,
            completed_agents: serde_json::from_str(&self.completed_agents).unwrap_or_default(),
            failed_agents: serde_json::from_str(&self.failed_agents).unwrap_or_default(),
            agent_confidences: serde_json::from_str(&self.agent_confidences).unwrap_or_default(),
            failure_reason: self.failure_reason,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
            completed_at: self.completed_at.map(timestamp_to_datetime),
        }
    }
}

impl From<&Run> for RunRow {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.to_string(),
            subject_id: run.subject_id.clone(),
            subject: serde_json::to_string(&run.subject).unwrap_or_else(|_| "{}".to_string()),
            status: run.status.as_str().to_string(),
            phase: run.phase.clone(),
            progress: run.progress as i64,
            completed_agents: serde_json::to_string(&run.completed_agents)
                .unwrap_or_else(|_| "[]".to_string()),
            failed_agents: serde_json::to_string(&run.failed_agents)
                .unwrap_or_else(|_| "[]".to_string()),
            agent_confidences: serde_json::to_string(&run.agent_confidences)
                .unwrap_or_else(|_| "{}".to_string()),
            failure_reason: run.failure_reason.clone(),
            created_at: datetime_to_timestamp(run.created_at),
            updated_at: datetime_to_timestamp(run.updated_at),
            completed_at: run.completed_at.map(datetime_to_timestamp),
        }
    }
}

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
