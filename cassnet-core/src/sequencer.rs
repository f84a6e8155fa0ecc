//! Campaign sequencer: runs scenarios one at a time.
//!
//! Per scenario: claim a run directory, apply the fault, run the workload,
//! revoke the fault, then seal the run (or mark it aborted). Scenario
//! failures are logged and the campaign moves on, unless `abort_on_error`
//! is set. A fault that cannot be revoked stops the campaign so no later
//! scenario runs on top of it.

use cassnet_types::{RunId, Scenario, ScenarioState, TargetNode, WorkloadSpec};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::backend::{FaultBackend, WorkloadBackend};
use crate::cancel::CancelSignal;
use crate::controller::FaultController;
use crate::error::{CampaignError, Result};
use crate::recorder::{RunMetadata, RunRecord, RunRecorder};
use crate::reporter::StressDigest;
use crate::runner::{CapturedOutput, ExperimentRunner};

/// What happened to one scenario.
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// Scenario label.
    pub label: String,
    /// Final state: `DONE` or `ABORTED`.
    pub state: ScenarioState,
    /// Run directory id, if one was claimed.
    pub run_id: Option<RunId>,
    /// Time spent on the scenario.
    pub elapsed: Duration,
    /// Why the scenario aborted.
    pub error: Option<CampaignError>,
    /// The scenario's fault could not be revoked.
    pub leaked: bool,
}

impl ScenarioOutcome {
    fn not_run(label: &str, reason: &str) -> Self {
        Self {
            label: label.to_string(),
            state: ScenarioState::Aborted,
            run_id: None,
            elapsed: Duration::ZERO,
            error: Some(CampaignError::Halted(reason.to_string())),
            leaked: false,
        }
    }

    /// Whether the scenario reached `DONE`.
    pub fn is_done(&self) -> bool {
        self.state == ScenarioState::Done
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} {:<20} {:>7.1}s",
            self.state.as_str(),
            self.label,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(id) = &self.run_id {
            write!(f, "  {}", id)?;
        }
        if let Some(e) = &self.error {
            write!(f, "  ({})", e)?;
        }
        Ok(())
    }
}

/// Result of a whole campaign, one outcome per enqueued scenario.
#[derive(Debug, Default)]
pub struct CampaignReport {
    /// Outcomes in enqueue order.
    pub outcomes: Vec<ScenarioOutcome>,
    /// Why the campaign stopped early, if it did.
    pub halted: Option<CampaignError>,
}

impl CampaignReport {
    /// Outcomes that reached `DONE`.
    pub fn done(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| o.is_done())
    }

    /// Outcomes that ended `ABORTED`, including scenarios never started.
    pub fn aborted(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| !o.is_done())
    }

    /// Process exit code: 0 if everything is done, else the aborted count
    /// capped at 255.
    pub fn exit_code(&self) -> i32 {
        self.aborted().count().min(255) as i32
    }

    /// Final summary, listing aborted scenarios separately.
    pub fn summary(&self) -> String {
        let done: Vec<&str> = self.done().map(|o| o.label.as_str()).collect();
        let aborted: Vec<&str> = self.aborted().map(|o| o.label.as_str()).collect();
        let mut out = format!(
            "{} scenario(s): {} DONE, {} ABORTED\n",
            self.outcomes.len(),
            done.len(),
            aborted.len()
        );
        if !done.is_empty() {
            out.push_str(&format!("  DONE:    {}\n", done.join(", ")));
        }
        if !aborted.is_empty() {
            out.push_str(&format!("  ABORTED: {}\n", aborted.join(", ")));
        }
        if let Some(reason) = &self.halted {
            out.push_str(&format!("  halted:  {}\n", reason));
        }
        out
    }
}

/// An ordered list of scenarios and everything needed to run them.
#[derive(Debug)]
pub struct Campaign<B, W> {
    controller: FaultController<B>,
    runner: ExperimentRunner<W>,
    recorder: RunRecorder,
    workload: WorkloadSpec,
    load_nodes: Vec<TargetNode>,
    abort_on_error: bool,
    scenarios: Vec<Scenario>,
}

impl<B: FaultBackend, W: WorkloadBackend> Campaign<B, W> {
    /// Create an empty campaign. The workload connects to `load_nodes`.
    pub fn new(
        controller: FaultController<B>,
        runner: ExperimentRunner<W>,
        recorder: RunRecorder,
        workload: WorkloadSpec,
        load_nodes: Vec<TargetNode>,
    ) -> Self {
        Self {
            controller,
            runner,
            recorder,
            workload,
            load_nodes,
            abort_on_error: false,
            scenarios: Vec::new(),
        }
    }

    /// Stop at the first aborted scenario instead of continuing.
    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Append a scenario. Labels must be unique within the campaign.
    pub fn enqueue(&mut self, scenario: Scenario) -> Result<()> {
        if self.scenarios.iter().any(|s| s.label() == scenario.label()) {
            return Err(CampaignError::DuplicateLabel(scenario.label().to_string()));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Append several scenarios, rejecting the batch on a duplicate label.
    pub fn enqueue_all(&mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Result<()> {
        let scenarios: Vec<Scenario> = scenarios.into_iter().collect();
        let mut seen: HashSet<&str> = self.scenarios.iter().map(|s| s.label().as_str()).collect();
        for scenario in &scenarios {
            if !seen.insert(scenario.label().as_str()) {
                return Err(CampaignError::DuplicateLabel(scenario.label().to_string()));
            }
        }
        self.scenarios.extend(scenarios);
        Ok(())
    }

    /// Enqueued scenarios.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The fault controller.
    pub fn controller(&self) -> &FaultController<B> {
        &self.controller
    }

    /// The run recorder.
    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    /// Run every scenario in order.
    pub async fn run(&self, cancel: &CancelSignal) -> CampaignReport {
        let mut report = CampaignReport::default();
        tracing::info!("Starting campaign of {} scenario(s)", self.scenarios.len());

        for scenario in &self.scenarios {
            if report.halted.is_some() {
                report
                    .outcomes
                    .push(ScenarioOutcome::not_run(scenario.label().as_str(), "not run"));
                continue;
            }
            if cancel.is_cancelled() {
                report.halted = Some(CampaignError::Halted("cancelled".into()));
                report
                    .outcomes
                    .push(ScenarioOutcome::not_run(scenario.label().as_str(), "cancelled"));
                continue;
            }

            let outcome = self.run_scenario(scenario, cancel).await;

            if outcome.leaked {
                report.halted = Some(CampaignError::Halted(format!(
                    "fault of {} could not be revoked",
                    outcome.label
                )));
            } else if !outcome.is_done() {
                if cancel.is_cancelled() {
                    report.halted = Some(CampaignError::Halted("cancelled".into()));
                } else if self.abort_on_error {
                    report.halted = Some(CampaignError::Halted(format!(
                        "{} aborted and abort_on_error is set",
                        outcome.label
                    )));
                }
            }
            report.outcomes.push(outcome);
        }

        if let Some(reason) = &report.halted {
            tracing::error!("Campaign halted: {}", reason);
        }
        tracing::info!(
            "Campaign finished: {} done, {} aborted",
            report.done().count(),
            report.aborted().count()
        );
        report
    }

    /// Run one scenario through the full state machine.
    ///
    /// Never fails: every error ends up in the outcome as `ABORTED`.
    pub async fn run_scenario(&self, scenario: &Scenario, cancel: &CancelSignal) -> ScenarioOutcome {
        let label = scenario.label().as_str();
        let started = Instant::now();
        let mut state = ScenarioState::Pending;
        tracing::info!("[{}] {} ({}s)", label, scenario.fault(), scenario.duration_secs());

        let record = match self.recorder.begin(scenario, &self.workload) {
            Ok(record) => record,
            Err(e) => return self.aborted(label, state, None, started, e, false),
        };

        let scoped = self
            .controller
            .scoped(scenario.fault(), || {
                let state = &mut state;
                async move {
                    transition(label, state, ScenarioState::FaultApplied)?;
                    transition(label, state, ScenarioState::Running)?;
                    self.runner
                        .run(&self.load_nodes, &self.workload, scenario.duration_secs(), cancel)
                        .await
                }
            })
            .await;

        let (body, revoke) = match scoped {
            Ok(scoped) => (scoped.body, scoped.revoke),
            Err(apply_error) => {
                let revoke = self.controller.revoke(scenario.fault().targets()).await;
                (Err(apply_error), revoke)
            }
        };

        let leaked = match revoke {
            Ok(()) => None,
            Err(first) => {
                tracing::warn!(
                    "[{}] FAULT STILL ACTIVE on {:?}: {}; retrying revoke",
                    label,
                    scenario.fault().to_string(),
                    first
                );
                self.controller
                    .revoke(scenario.fault().targets())
                    .await
                    .err()
            }
        };

        if let Some(revoke_error) = leaked {
            tracing::error!("[{}] Fault could not be revoked: {}", label, revoke_error);
            let partial = match &body {
                Ok(captured) => captured.bytes.clone(),
                Err(e) => e.partial_output().map(<[u8]>::to_vec).unwrap_or_default(),
            };
            self.abandon(&record, &revoke_error, &partial);
            return self.aborted(label, state, Some(&record), started, revoke_error, true);
        }

        match body {
            Ok(captured) => match self.seal(label, &mut state, &record, &captured) {
                Ok(()) => {
                    tracing::info!("[{}] DONE in {:.1}s", label, started.elapsed().as_secs_f64());
                    ScenarioOutcome {
                        label: label.to_string(),
                        state,
                        run_id: Some(record.id().clone()),
                        elapsed: started.elapsed(),
                        error: None,
                        leaked: false,
                    }
                }
                Err(e) => {
                    self.abandon(&record, &e, &captured.bytes);
                    self.aborted(label, state, Some(&record), started, e, false)
                }
            },
            Err(e) => {
                let partial = e.partial_output().unwrap_or_default().to_vec();
                self.abandon(&record, &e, &partial);
                self.aborted(label, state, Some(&record), started, e, false)
            }
        }
    }

    fn seal(
        &self,
        label: &str,
        state: &mut ScenarioState,
        record: &RunRecord,
        captured: &CapturedOutput,
    ) -> Result<()> {
        transition(label, state, ScenarioState::Recording)?;
        let mut meta = RunMetadata::for_run(record, &self.workload);
        meta.set("state", ScenarioState::Done);
        meta.set("elapsed_secs", format!("{:.1}", captured.elapsed.as_secs_f64()));
        meta.set("bytes", captured.bytes.len());
        meta.set("command", captured.argv.join(" "));
        if let Ok(Some(digest)) = StressDigest::from_reader(&captured.bytes[..]) {
            digest.write_to(&mut meta);
        }
        self.recorder.seal(record, &captured.bytes, &meta)?;
        transition(label, state, ScenarioState::Done)
    }

    fn abandon(&self, record: &RunRecord, error: &CampaignError, partial: &[u8]) {
        if let Err(e) = self.recorder.mark_aborted(record, &error.to_string(), partial) {
            tracing::error!("Failed to mark run {} aborted: {}", record.id(), e);
        }
    }

    fn aborted(
        &self,
        label: &str,
        state: ScenarioState,
        record: Option<&RunRecord>,
        started: Instant,
        error: CampaignError,
        leaked: bool,
    ) -> ScenarioOutcome {
        tracing::error!("[{}] ABORTED in {}: {}", label, state, error);
        ScenarioOutcome {
            label: label.to_string(),
            state: ScenarioState::Aborted,
            run_id: record.map(|r| r.id().clone()),
            elapsed: started.elapsed(),
            error: Some(error),
            leaked,
        }
    }
}

fn transition(label: &str, state: &mut ScenarioState, next: ScenarioState) -> Result<()> {
    let from = *state;
    *state = from.advance(next)?;
    tracing::info!("[{}] {} -> {}", label, from, next);
    Ok(())
}
