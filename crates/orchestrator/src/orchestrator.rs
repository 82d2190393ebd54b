use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agents::{AgentContext, AgentRegistry, AgentReport, AgentRunner};
use chrono::Utc;
use db::{DbError, RunRepository, StatusUpdate};
use events::{ProgressBus, ScanEvent};
use futures::stream::{self, StreamExt, TryStreamExt};
use leadlens_core::{
    AgentRecord, AgentSpec, Checkpoint, PendingQuestion, PhasePlan, Run, RunStatus,
};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::planner::build_plan;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Agents of one phase in flight at once; bounds downstream rate usage.
    pub max_concurrency: usize,
    /// In-process attempts per agent per job execution.
    pub agent_attempts: u32,
    /// Delay between in-process attempts.
    pub retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            agent_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of running one phase cohort.
enum PhaseOutcome {
    Advance,
    AwaitingAnswer,
    Failed {
        reason: String,
        failed_agents: Vec<String>,
    },
    /// The run went terminal (e.g. cancelled) while the phase was in flight.
    RunTerminal,
}

/// Drives the phase sequence of scan runs.
///
/// One `execute` call handles as many phases as it can in sequence; a pause
/// or terminal state ends it. All durable state lives in the run row and
/// checkpoint, so re-invoking after a crash resumes exactly where the last
/// merge landed.
pub struct ScanOrchestrator {
    runs: RunRepository,
    bus: ProgressBus,
    runner: AgentRunner,
    registry: AgentRegistry,
    config: OrchestratorConfig,
}

impl ScanOrchestrator {
    pub fn new(
        runs: RunRepository,
        bus: ProgressBus,
        runner: AgentRunner,
        registry: AgentRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runs,
            bus,
            runner,
            registry,
            config,
        }
    }

    /// Execute a run from wherever its checkpoint left off.
    pub async fn execute(&self, run_id: Uuid) -> Result<()> {
        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            tracing::warn!(run_id = %run_id, status = %run.status.as_str(), "Refusing to execute terminal run");
            return Ok(());
        }

        let mut checkpoint = match self.runs.load_checkpoint(run_id).await? {
            Some(cp) => cp,
            None => self.plan_run(&run).await?,
        };
        if checkpoint.pending_question.is_some() {
            tracing::warn!(run_id = %run_id, "Run is waiting for an answer, nothing to execute");
            return Ok(());
        }

        loop {
            // Refresh the row each phase: agent sets accrued by merges, and
            // a possible external cancellation.
            let run = self
                .runs
                .find_by_id(run_id)
                .await?
                .ok_or(OrchestratorError::RunNotFound(run_id))?;
            if run.status.is_terminal() {
                tracing::info!(run_id = %run_id, status = %run.status.as_str(), "Run reached terminal status, stopping");
                return Ok(());
            }

            let phase = checkpoint
                .plan
                .phase(&checkpoint.phase)
                .cloned()
                .ok_or_else(|| OrchestratorError::UnknownPhase(checkpoint.phase.clone()))?;

            match self.run_phase(run_id, &run, &mut checkpoint, &phase).await? {
                PhaseOutcome::Failed {
                    reason,
                    failed_agents,
                } => {
                    self.fail_run_with(run_id, &reason, failed_agents).await?;
                    return Ok(());
                }
                PhaseOutcome::AwaitingAnswer => return Ok(()),
                PhaseOutcome::RunTerminal => return Ok(()),
                PhaseOutcome::Advance => {
                    match checkpoint.plan.phase_after(&phase.name).map(|p| p.name.clone()) {
                        Some(next) => {
                            checkpoint.phase = next;
                            self.runs.save_checkpoint(run_id, &checkpoint).await?;
                        }
                        None => {
                            self.complete_run(run_id).await?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Mark a run failed with a durable reason. Used for phase failures and
    /// by the queue when a job exhausts its retry budget. Already-terminal
    /// runs are left untouched.
    pub async fn fail_run(&self, run_id: Uuid, reason: &str) -> Result<()> {
        let failed_agents = self
            .runs
            .find_by_id(run_id)
            .await?
            .map(|r| r.failed_agents)
            .unwrap_or_default();
        self.fail_run_with(run_id, reason, failed_agents).await
    }

    /// Plan a fresh checkpoint for a run with no (or corrupt) checkpoint.
    ///
    /// The run row's agent sets are the durable source of truth: the new
    /// checkpoint is positioned at the first phase that still has
    /// unresolved agents, so completed agents are never re-run even when
    /// the richer blob was lost.
    async fn plan_run(&self, run: &Run) -> Result<Checkpoint> {
        let plan = build_plan(&run.subject);
        let phase = plan
            .phases
            .iter()
            .find(|p| p.agents.iter().any(|a| !run.has_resolved(&a.name)))
            .or_else(|| plan.phases.last())
            .map(|p| p.name.clone())
            .ok_or(OrchestratorError::EmptyPlan)?;

        tracing::info!(
            run_id = %run.id,
            phase = %phase,
            phases = plan.phases.len(),
            "Planned scan run"
        );

        let checkpoint = Checkpoint::new(run.subject.clone(), plan, phase);
        self.runs.save_checkpoint(run.id, &checkpoint).await?;
        Ok(checkpoint)
    }

    async fn run_phase(
        &self,
        run_id: Uuid,
        run: &Run,
        checkpoint: &mut Checkpoint,
        phase: &PhasePlan,
    ) -> Result<PhaseOutcome> {
        // Idempotence-by-checkpoint: agents that already resolved in a
        // previous job execution are not launched again.
        let pending: Vec<AgentSpec> = phase
            .agents
            .iter()
            .filter(|a| !run.has_resolved(&a.name))
            .cloned()
            .collect();

        self.bus.publish(
            run_id,
            ScanEvent::PhaseStarted {
                phase: phase.name.clone(),
                agents: pending.iter().map(|a| a.name.clone()).collect(),
            },
        );
        tracing::info!(
            run_id = %run_id,
            phase = %phase.name,
            pending = pending.len(),
            "Phase started"
        );

        let total_phases = checkpoint.plan.phases.len().max(1);
        let phase_idx = checkpoint.plan.phase_index(&phase.name).unwrap_or(0);
        let cohort = phase.agents.len().max(1);
        let resolved_counter = AtomicUsize::new(cohort - pending.len());

        let ctx = AgentContext {
            subject: checkpoint.subject.clone(),
            answers: checkpoint.answers.clone(),
            prior_results: checkpoint.phase_results.clone(),
        };

        // All agents are started before any is awaited individually; each
        // resolution is merged and published the moment it lands.
        let ctx_ref = &ctx;
        let counter_ref = &resolved_counter;
        let outcomes: Vec<(AgentSpec, Option<AgentReport>)> = stream::iter(pending)
            .map(|spec| {
                let phase_name = phase.name.clone();
                async move {
                    let report = self.run_agent(run_id, &phase_name, &spec, ctx_ref).await?;
                    let resolved = counter_ref.fetch_add(1, Ordering::SeqCst) + 1;
                    let progress = phase_progress(phase_idx, total_phases, resolved, cohort);
                    self.runs.set_progress(run_id, progress).await?;
                    self.bus
                        .publish(run_id, ScanEvent::ProgressUpdated { progress });
                    Ok::<_, OrchestratorError>((spec, report))
                }
            })
            .buffer_unordered(self.config.max_concurrency)
            .try_collect()
            .await?;

        for (spec, report) in outcomes {
            if let Some(report) = report {
                checkpoint.record_result(
                    &phase.name,
                    &spec.name,
                    AgentRecord {
                        confidence: report.confidence,
                        output: report.output,
                        completed_at: Utc::now(),
                    },
                );
            }
        }

        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            tracing::info!(run_id = %run_id, "Run went terminal mid-phase, discarding outcome");
            return Ok(PhaseOutcome::RunTerminal);
        }

        // An agent completed in an earlier execution may have no record in
        // the checkpoint (crash between merge and checkpoint write). Backfill
        // from the run row so the phase's results are populated before we
        // advance; the rich output is gone, the confidence survives.
        for spec in &phase.agents {
            let recorded = checkpoint
                .results_for(&phase.name)
                .map_or(false, |m| m.contains_key(&spec.name));
            if run.is_completed(&spec.name) && !recorded {
                checkpoint.record_result(
                    &phase.name,
                    &spec.name,
                    AgentRecord {
                        confidence: run.agent_confidences.get(&spec.name).copied().unwrap_or(0),
                        output: serde_json::Value::Null,
                        completed_at: Utc::now(),
                    },
                );
            }
        }

        let required: Vec<&AgentSpec> = phase.required_agents().collect();
        if !required.is_empty()
            && required
                .iter()
                .all(|a| run.failed_agents.contains(&a.name))
        {
            return Ok(PhaseOutcome::Failed {
                reason: format!("all required agents of phase {} failed", phase.name),
                failed_agents: run.failed_agents.clone(),
            });
        }

        if let Some(question) = &phase.question {
            if !checkpoint.answers.contains_key(&question.id) {
                checkpoint.pending_question = Some(PendingQuestion {
                    id: question.id.clone(),
                    prompt: question.prompt.clone(),
                    phase: phase.name.clone(),
                    asked_at: Utc::now(),
                });
                // Derives waiting_for_user; the job is not re-enqueued, an
                // external answer resumes the run.
                self.runs.save_checkpoint(run_id, checkpoint).await?;
                self.bus.publish(
                    run_id,
                    ScanEvent::QuestionRaised {
                        question_id: question.id.clone(),
                        prompt: question.prompt.clone(),
                    },
                );
                tracing::info!(
                    run_id = %run_id,
                    phase = %phase.name,
                    question = %question.id,
                    "Run paused, waiting for user input"
                );
                return Ok(PhaseOutcome::AwaitingAnswer);
            }
        }

        match self
            .runs
            .set_status(
                run_id,
                RunStatus::PhaseComplete,
                StatusUpdate {
                    phase: Some(phase.name.clone()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => Ok(PhaseOutcome::Advance),
            Err(DbError::InvalidTransition { .. }) => Ok(PhaseOutcome::RunTerminal),
            Err(e) => Err(e.into()),
        }
    }

    /// Run one agent, retrying in-process up to `agent_attempts` times.
    ///
    /// Every resolution, including each failed attempt, is merged into the
    /// run store immediately: a crash loses at most the agents still in
    /// flight, never one that already resolved. A success after a recorded
    /// failure clears the failure (store-side).
    ///
    /// Returns `Ok(None)` when the agent exhausted its attempts; agent
    /// failures are absorbed here and never reach the job queue.
    async fn run_agent(
        &self,
        run_id: Uuid,
        phase: &str,
        spec: &AgentSpec,
        ctx: &AgentContext,
    ) -> Result<Option<AgentReport>> {
        let Some(agent) = self.registry.get(&spec.name) else {
            tracing::warn!(run_id = %run_id, agent = %spec.name, "Agent not registered");
            self.runs.merge_agent_failed(run_id, &spec.name).await?;
            self.bus.publish(
                run_id,
                ScanEvent::AgentFailed {
                    phase: phase.to_string(),
                    agent: spec.name.clone(),
                    kind: "unknown_agent".to_string(),
                    message: format!("no agent registered under {:?}", spec.name),
                },
            );
            return Ok(None);
        };

        self.bus.publish(
            run_id,
            ScanEvent::AgentStarted {
                phase: phase.to_string(),
                agent: spec.name.clone(),
            },
        );

        for attempt in 1..=self.config.agent_attempts {
            match self.runner.run(agent.as_ref(), ctx).await {
                Ok(report) => {
                    self.runs
                        .merge_agent_complete(run_id, &spec.name, report.confidence)
                        .await?;
                    self.bus.publish(
                        run_id,
                        ScanEvent::AgentCompleted {
                            phase: phase.to_string(),
                            agent: spec.name.clone(),
                            confidence: report.confidence,
                        },
                    );
                    tracing::info!(
                        run_id = %run_id,
                        agent = %spec.name,
                        attempt,
                        confidence = report.confidence,
                        "Agent completed"
                    );
                    return Ok(Some(report));
                }
                Err(failure) => {
                    tracing::warn!(
                        run_id = %run_id,
                        agent = %spec.name,
                        attempt,
                        kind = failure.kind(),
                        error = %failure,
                        "Agent attempt failed"
                    );
                    self.runs.merge_agent_failed(run_id, &spec.name).await?;
                    self.bus.publish(
                        run_id,
                        ScanEvent::AgentFailed {
                            phase: phase.to_string(),
                            agent: spec.name.clone(),
                            kind: failure.kind().to_string(),
                            message: failure.to_string(),
                        },
                    );
                    if attempt < self.config.agent_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        Ok(None)
    }

    async fn complete_run(&self, run_id: Uuid) -> Result<()> {
        match self
            .runs
            .set_status(
                run_id,
                RunStatus::Completed,
                StatusUpdate {
                    progress: Some(100),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => {
                self.bus.publish(run_id, ScanEvent::RunCompleted);
                tracing::info!(run_id = %run_id, "Run completed");
                Ok(())
            }
            // Lost a race against cancellation; the cancel wins.
            Err(DbError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fail_run_with(
        &self,
        run_id: Uuid,
        reason: &str,
        failed_agents: Vec<String>,
    ) -> Result<()> {
        match self
            .runs
            .set_status(
                run_id,
                RunStatus::Failed,
                StatusUpdate {
                    completed_at: Some(Utc::now()),
                    failure_reason: Some(reason.to_string()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => {
                self.bus.publish(
                    run_id,
                    ScanEvent::RunFailed {
                        reason: reason.to_string(),
                        failed_agents,
                    },
                );
                tracing::error!(run_id = %run_id, reason = %reason, "Run failed");
                Ok(())
            }
            Err(DbError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Integer progress: completed phases plus the resolved share of the
/// current cohort, held below 100 until the run actually completes.
fn phase_progress(phase_idx: usize, total_phases: usize, resolved: usize, cohort: usize) -> u8 {
    let done = phase_idx * cohort + resolved;
    let total = total_phases * cohort;
    ((done * 100 / total.max(1)) as u8).min(99)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progress() {
        // 3 phases, 2-agent cohorts: finishing phase 1 is a third of the run.
        assert_eq!(phase_progress(0, 3, 1, 2), 16);
        assert_eq!(phase_progress(0, 3, 2, 2), 33);
        assert_eq!(phase_progress(1, 3, 2, 2), 66);
        // The last agent of the last phase caps at 99; complete_run owns 100.
        assert_eq!(phase_progress(2, 3, 2, 2), 99);
    }

    #[test]
    fn test_phase_progress_is_monotone_per_phase() {
        let mut last = 0;
        for phase in 0..3 {
            for resolved in 1..=4 {
                let p = phase_progress(phase, 3, resolved, 4);
                assert!(p >= last);
                last = p;
            }
        }
    }
}
