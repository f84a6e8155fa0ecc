//! In-memory backends for testing.
//!
//! [`FakeFaultBackend`] stands in for the kernel's qdisc table on every node
//! and records each call; [`FakeWorkloadBackend`] plays back scripted
//! workload behaviours. Both allow failure injection.

use async_trait::async_trait;
use cassnet_types::TargetNode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::{FaultBackend, Termination, WorkloadBackend, WorkloadOutcome};
use crate::cancel::CancelSignal;
use crate::error::BackendError;
use crate::netem::{NetemConfig, NO_QDISC_LINE};

/// How long an injected hang lasts; far past any control-plane ceiling.
const HANG: Duration = Duration::from_secs(24 * 3600);

/// Fault backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    /// `prepare`
    Prepare,
    /// `install`
    Install,
    /// `remove`
    Remove,
    /// `show`
    Show,
}

/// One recorded fault backend call.
#[derive(Debug, Clone)]
pub struct FaultEvent {
    /// Operation.
    pub op: FaultOp,
    /// Node name.
    pub node: String,
    /// When the call completed.
    pub at: Instant,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Installed config for successful installs.
    pub netem: Option<NetemConfig>,
}

/// In-memory fault backend.
///
/// Cloning shares state, so a test keeps a clone to inspect what the
/// controller did.
#[derive(Debug, Clone, Default)]
pub struct FakeFaultBackend {
    inner: Arc<Mutex<FakeFaultInner>>,
}

#[derive(Debug, Default)]
struct FakeFaultInner {
    active: HashMap<String, NetemConfig>,
    events: Vec<FaultEvent>,
    fail_install: HashSet<String>,
    fail_remove: HashMap<String, u32>,
    ignore_install: HashSet<String>,
    hang: HashSet<(String, FaultOp)>,
}

impl FakeFaultBackend {
    /// Create a new fake with no active impairments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Impairment currently installed on `node`.
    pub fn active(&self, node: &str) -> Option<NetemConfig> {
        let inner = self.inner.lock().unwrap();
        inner.active.get(node).cloned()
    }

    /// Names of every node with an impairment installed, sorted.
    pub fn active_nodes(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut nodes: Vec<String> = inner.active.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Every call recorded so far, in completion order.
    pub fn events(&self) -> Vec<FaultEvent> {
        let inner = self.inner.lock().unwrap();
        inner.events.clone()
    }

    /// Number of calls of `op` against `node`, counting only successes if `ok_only`.
    pub fn count(&self, op: FaultOp, node: &str, ok_only: bool) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .filter(|e| e.op == op && e.node == node && (e.ok || !ok_only))
            .count()
    }

    /// Pretend a previous run left `netem` installed on `node`.
    pub fn preset(&self, node: &str, netem: NetemConfig) {
        let mut inner = self.inner.lock().unwrap();
        inner.active.insert(node.to_string(), netem);
    }

    /// Make every install on `node` fail.
    pub fn fail_install_on(&self, node: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_install.insert(node.to_string());
    }

    /// Make the next `times` removes on `node` fail.
    pub fn fail_remove_on(&self, node: &str, times: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_remove.insert(node.to_string(), times);
    }

    /// Make installs on `node` report success without touching the qdisc.
    pub fn ignore_install_on(&self, node: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.ignore_install.insert(node.to_string());
    }

    /// Make `op` on `node` hang well past any timeout.
    pub fn hang_on(&self, node: &str, op: FaultOp) {
        let mut inner = self.inner.lock().unwrap();
        inner.hang.insert((node.to_string(), op));
    }

    /// Clear all state and injected failures.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = FakeFaultInner::default();
    }

    async fn maybe_hang(&self, node: &str, op: FaultOp) {
        let hangs = {
            let inner = self.inner.lock().unwrap();
            inner.hang.contains(&(node.to_string(), op))
        };
        if hangs {
            tokio::time::sleep(HANG).await;
        }
    }
}

impl FakeFaultInner {
    fn record(&mut self, op: FaultOp, node: &str, ok: bool, netem: Option<NetemConfig>) {
        self.events.push(FaultEvent {
            op,
            node: node.to_string(),
            at: Instant::now(),
            ok,
            netem,
        });
    }
}

#[async_trait]
impl FaultBackend for FakeFaultBackend {
    async fn prepare(&self, node: &TargetNode) -> Result<(), BackendError> {
        self.maybe_hang(node.name(), FaultOp::Prepare).await;
        let mut inner = self.inner.lock().unwrap();
        inner.record(FaultOp::Prepare, node.name(), true, None);
        Ok(())
    }

    async fn install(&self, node: &TargetNode, netem: &NetemConfig) -> Result<(), BackendError> {
        self.maybe_hang(node.name(), FaultOp::Install).await;
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_install.contains(node.name()) {
            inner.record(FaultOp::Install, node.name(), false, None);
            return Err(BackendError::Injected(format!(
                "install refused on {}",
                node.name()
            )));
        }

        if !inner.ignore_install.contains(node.name()) {
            inner.active.insert(node.name().to_string(), netem.clone());
        }
        inner.record(FaultOp::Install, node.name(), true, Some(netem.clone()));
        Ok(())
    }

    async fn remove(&self, node: &TargetNode, _interface: &str) -> Result<(), BackendError> {
        self.maybe_hang(node.name(), FaultOp::Remove).await;
        let mut inner = self.inner.lock().unwrap();

        if let Some(left) = inner.fail_remove.get_mut(node.name()) {
            if *left > 0 {
                *left -= 1;
                inner.record(FaultOp::Remove, node.name(), false, None);
                return Err(BackendError::Injected(format!(
                    "remove refused on {}",
                    node.name()
                )));
            }
        }

        inner.active.remove(node.name());
        inner.record(FaultOp::Remove, node.name(), true, None);
        Ok(())
    }

    async fn show(&self, node: &TargetNode, _interface: &str) -> Result<String, BackendError> {
        self.maybe_hang(node.name(), FaultOp::Show).await;
        let mut inner = self.inner.lock().unwrap();
        let line = match inner.active.get(node.name()) {
            Some(netem) => netem.to_show_line(),
            None => NO_QDISC_LINE.to_string(),
        };
        inner.record(FaultOp::Show, node.name(), true, None);
        Ok(line)
    }
}

/// Scripted behaviour for one workload invocation.
#[derive(Debug, Clone)]
pub enum FakeWorkload {
    /// Print `output` after `after`, then exit 0.
    Succeed {
        /// Output to capture.
        output: Vec<u8>,
        /// Simulated run time.
        after: Duration,
    },
    /// Print `output` after `after`, then exit with `exit_code`.
    Fail {
        /// Output to capture.
        output: Vec<u8>,
        /// Exit code.
        exit_code: i64,
        /// Simulated run time.
        after: Duration,
    },
    /// Print `output` immediately, then never exit on its own.
    Hang {
        /// Output captured before the hang.
        output: Vec<u8>,
    },
    /// Fail to start at all.
    SpawnError(String),
}

/// Scripted workload backend.
///
/// Each `execute` pops the next scripted behaviour; once the script is
/// exhausted every run succeeds immediately with a short stress-like log.
#[derive(Debug, Clone, Default)]
pub struct FakeWorkloadBackend {
    inner: Arc<Mutex<FakeWorkloadInner>>,
}

#[derive(Debug, Default)]
struct FakeWorkloadInner {
    script: VecDeque<FakeWorkload>,
    prepare_calls: u32,
    fail_prepare: u32,
    runs: Vec<Vec<String>>,
    windows: Vec<(Instant, Instant)>,
}

impl FakeWorkloadBackend {
    /// Create a new fake with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behaviour of the next invocation.
    pub fn push(&self, behaviour: FakeWorkload) {
        let mut inner = self.inner.lock().unwrap();
        inner.script.push_back(behaviour);
    }

    /// Make the next `times` preparations fail.
    pub fn fail_prepare(&self, times: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_prepare = times;
    }

    /// How many times `prepare` was called.
    pub fn prepare_calls(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.prepare_calls
    }

    /// argv of every invocation.
    pub fn runs(&self) -> Vec<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        inner.runs.clone()
    }

    /// (start, end) of every invocation that got past spawning.
    pub fn windows(&self) -> Vec<(Instant, Instant)> {
        let inner = self.inner.lock().unwrap();
        inner.windows.clone()
    }

    /// Default log: three `cassandra-stress` style interval lines.
    pub fn default_output() -> Vec<u8> {
        b"type       total ops,    op/s,    pk/s,   row/s,    mean,     med\n\
total,          9000,    9000,    9000,    9000,     5.5,     4.9\n\
total,         18200,    9200,    9200,    9200,     5.3,     4.8\n\
total,         27000,    8800,    8800,    8800,     5.7,     5.0\n"
            .to_vec()
    }
}

#[async_trait]
impl WorkloadBackend for FakeWorkloadBackend {
    async fn prepare(&self) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.prepare_calls += 1;
        if inner.fail_prepare > 0 {
            inner.fail_prepare -= 1;
            return Err(BackendError::Injected("prepare refused".into()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        argv: &[String],
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<WorkloadOutcome, BackendError> {
        let behaviour = {
            let mut inner = self.inner.lock().unwrap();
            inner.runs.push(argv.to_vec());
            inner.script.pop_front().unwrap_or(FakeWorkload::Succeed {
                output: Self::default_output(),
                after: Duration::ZERO,
            })
        };

        let (output, exit_code, run_for) = match behaviour {
            FakeWorkload::SpawnError(msg) => return Err(BackendError::Injected(msg)),
            FakeWorkload::Succeed { output, after } => (output, 0, Some(after)),
            FakeWorkload::Fail {
                output,
                exit_code,
                after,
            } => (output, exit_code, Some(after)),
            FakeWorkload::Hang { output } => (output, 0, None),
        };

        let started = Instant::now();
        let finish = async {
            match run_for {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };

        let termination = tokio::select! {
            _ = finish => Termination::Exited,
            _ = tokio::time::sleep_until(deadline) => Termination::DeadlineExceeded,
            _ = cancel.cancelled() => Termination::Cancelled,
        };

        {
            let mut inner = self.inner.lock().unwrap();
            inner.windows.push((started, Instant::now()));
        }

        Ok(WorkloadOutcome {
            output,
            exit_code: (termination == Termination::Exited).then_some(exit_code),
            termination,
        })
    }
}
