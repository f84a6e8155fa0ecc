//! Fault controller: apply, verify and revoke impairments on target nodes.
//!
//! Every per-target backend call is bounded by the fault operation timeout
//! and the targets of one spec are driven concurrently. `apply` pre-cleans,
//! installs, then reads back; a failure anywhere rolls back every target it
//! touched before the original error is returned.

use cassnet_types::{FaultSpec, Impairment, TargetNode};
use futures_util::future::join_all;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::backend::FaultBackend;
use crate::error::{BackendError, CampaignError, Result};
use crate::netem::{self, NetemConfig, DEFAULT_INTERFACE};

/// Default ceiling for a single fault backend call.
pub const DEFAULT_FAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Impairments observed on one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveImpairment {
    /// Node that was read.
    pub node: String,
    /// Impairments parsed from the node's root qdisc.
    pub impairments: Vec<Impairment>,
}

impl ActiveImpairment {
    /// True when the node carries no impairment.
    pub fn is_clear(&self) -> bool {
        self.impairments.is_empty()
    }

    /// Whether any observed impairment matches `expected`.
    pub fn satisfies(&self, expected: &Impairment) -> bool {
        self.impairments.iter().any(|o| expected.matches(o))
    }
}

impl fmt::Display for ActiveImpairment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, netem::describe(&self.impairments))
    }
}

/// Result of [`FaultController::scoped`]: the body's result and the revoke
/// that followed it, kept apart so neither hides the other.
#[derive(Debug)]
pub struct Scoped<T> {
    /// What the body returned.
    pub body: Result<T>,
    /// Outcome of the guaranteed revoke.
    pub revoke: Result<()>,
}

/// Applies and revokes impairments through a [`FaultBackend`].
#[derive(Debug)]
pub struct FaultController<B> {
    backend: B,
    interface: String,
    op_timeout: Duration,
}

impl<B: FaultBackend> FaultController<B> {
    /// Create a controller for the default interface and timeout.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            interface: DEFAULT_INTERFACE.to_string(),
            op_timeout: DEFAULT_FAULT_OP_TIMEOUT,
        }
    }

    /// Set the interface impairments are installed on.
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = interface.to_string();
        self
    }

    /// Set the per-call ceiling.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Apply `spec` to all of its targets.
    ///
    /// Pre-cleans the targets, installs the impairment and verifies it by
    /// reading it back. A baseline spec only pre-cleans.
    pub async fn apply(&self, spec: &FaultSpec) -> Result<()> {
        let targets: Vec<&TargetNode> = spec.targets().iter().collect();
        tracing::info!("Applying {}", spec);

        first_error(
            join_all(
                targets
                    .iter()
                    .map(|node| self.bounded(node, "prepare", self.backend.prepare(node))),
            )
            .await,
        )?;

        self.revoke_nodes(&targets).await?;

        let Some(impairment) = spec.impairment()? else {
            tracing::debug!("Baseline scenario, targets pre-cleaned");
            return Ok(());
        };
        let config = NetemConfig::from_impairment(&self.interface, &impairment);
        tracing::debug!("{}", config.to_tc_command());

        let installed = first_error(
            join_all(
                targets
                    .iter()
                    .map(|node| self.bounded(node, "apply", self.backend.install(node, &config))),
            )
            .await,
        );
        if let Err(e) = installed {
            self.rollback(&targets).await;
            return Err(e);
        }

        let verified = first_error(
            join_all(targets.iter().map(|node| self.verify(node, &impairment))).await,
        );
        if let Err(e) = verified {
            self.rollback(&targets).await;
            return Err(e);
        }

        tracing::info!("Applied {}", spec);
        Ok(())
    }

    /// Remove any impairment from `targets`. Removing nothing succeeds.
    ///
    /// A failed removal is retried once per node before it is reported.
    pub async fn revoke<'a>(&self, targets: impl IntoIterator<Item = &'a TargetNode>) -> Result<()> {
        let targets: Vec<&TargetNode> = targets.into_iter().collect();
        self.revoke_nodes(&targets).await
    }

    /// Read the impairments currently active on `node`.
    pub async fn read(&self, node: &TargetNode) -> Result<ActiveImpairment> {
        let raw = self
            .bounded(node, "read", self.backend.show(node, &self.interface))
            .await?;
        Ok(ActiveImpairment {
            node: node.name().to_string(),
            impairments: netem::parse_qdisc_show(&raw),
        })
    }

    /// Apply `spec`, run `body`, then revoke regardless of how `body` ended.
    ///
    /// Only an apply failure is returned as `Err`; the apply has already rolled
    /// itself back in that case. Bodies that can be cancelled should observe a
    /// [`CancelSignal`](crate::CancelSignal) and return instead of being
    /// dropped, so the revoke still runs.
    pub async fn scoped<T, F, Fut>(&self, spec: &FaultSpec, body: F) -> Result<Scoped<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.apply(spec).await?;
        let body = body().await;
        let revoke = self.revoke(spec.targets()).await;
        if let Err(e) = &revoke {
            tracing::warn!("Fault {} may still be active: {}", spec, e);
        }
        Ok(Scoped { body, revoke })
    }

    async fn revoke_nodes(&self, targets: &[&TargetNode]) -> Result<()> {
        first_error(join_all(targets.iter().map(|node| self.revoke_one(node))).await)
    }

    async fn revoke_one(&self, node: &TargetNode) -> Result<()> {
        self.bounded(node, "revoke", self.backend.prepare(node)).await?;
        match self.remove_once(node).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Revoke on {} failed, retrying: {}", node, e);
                self.remove_once(node).await
            }
        }
    }

    async fn remove_once(&self, node: &TargetNode) -> Result<()> {
        self.bounded(node, "revoke", self.backend.remove(node, &self.interface))
            .await
    }

    async fn verify(&self, node: &TargetNode, expected: &Impairment) -> Result<()> {
        let active = self.read(node).await?;
        if active.satisfies(expected) {
            return Ok(());
        }
        Err(CampaignError::FaultNotVerified {
            node: node.name().to_string(),
            expected: expected.to_string(),
            found: netem::describe(&active.impairments),
        })
    }

    async fn rollback(&self, targets: &[&TargetNode]) {
        tracing::warn!("Rolling back fault on {} target(s)", targets.len());
        if let Err(e) = self.revoke_nodes(targets).await {
            tracing::error!("Rollback incomplete: {}", e);
        }
    }

    /// Run one backend call under the op timeout, mapping failures to the
    /// error for `operation`.
    async fn bounded<T>(
        &self,
        node: &TargetNode,
        operation: &'static str,
        call: impl Future<Output = std::result::Result<T, BackendError>>,
    ) -> Result<T> {
        let node_name = node.name().to_string();
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(match operation {
                "revoke" => CampaignError::FaultRevoke {
                    node: node_name,
                    source,
                },
                "read" => CampaignError::Backend(source),
                _ => CampaignError::FaultApply {
                    node: node_name,
                    source,
                },
            }),
            Err(_) => Err(CampaignError::FaultOperationTimeout {
                node: node_name,
                operation,
                timeout: self.op_timeout,
            }),
        }
    }
}

fn first_error<T>(results: Vec<Result<T>>) -> Result<()> {
    for result in results {
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FakeFaultBackend, FaultOp};
    use cassnet_types::{FaultKind, NodeRole};

    fn node(name: &str) -> TargetNode {
        TargetNode::new(name, NodeRole::Peer).unwrap()
    }

    fn loss(targets: &[&str], magnitude: &str) -> FaultSpec {
        FaultSpec::new(FaultKind::Loss, targets.iter().map(|n| node(n)), magnitude).unwrap()
    }

    fn controller(fake: &FakeFaultBackend) -> FaultController<FakeFaultBackend> {
        FaultController::new(fake.clone())
    }

    #[tokio::test]
    async fn apply_read_revoke_two_nodes() {
        let fake = FakeFaultBackend::new();
        let ctl = controller(&fake);
        let spec = loss(&["cassandra2", "cassandra3"], "10%");

        ctl.apply(&spec).await.unwrap();
        for name in ["cassandra2", "cassandra3"] {
            let active = ctl.read(&node(name)).await.unwrap();
            assert_eq!(
                active.impairments,
                vec![Impairment::Loss {
                    percent: 10.0,
                    correlation: None
                }]
            );
        }

        ctl.revoke(spec.targets()).await.unwrap();
        for name in ["cassandra2", "cassandra3"] {
            assert!(ctl.read(&node(name)).await.unwrap().is_clear());
        }
    }

    #[tokio::test]
    async fn apply_pre_cleans_stale_fault() {
        let fake = FakeFaultBackend::new();
        fake.preset("cassandra2", NetemConfig::new().delay(100));
        let ctl = controller(&fake);

        ctl.apply(&loss(&["cassandra2"], "20%")).await.unwrap();

        let events: Vec<FaultOp> = fake
            .events()
            .into_iter()
            .filter(|e| e.op != FaultOp::Prepare && e.op != FaultOp::Show)
            .map(|e| e.op)
            .collect();
        assert_eq!(events, vec![FaultOp::Remove, FaultOp::Install]);
        assert_eq!(fake.active("cassandra2").unwrap().loss_percent, Some(20.0));
    }

    #[tokio::test]
    async fn baseline_only_pre_cleans() {
        let fake = FakeFaultBackend::new();
        fake.preset("cassandra2", NetemConfig::new().loss(30.0));
        let ctl = controller(&fake);

        ctl.apply(&FaultSpec::none([node("cassandra2")])).await.unwrap();

        assert!(fake.active_nodes().is_empty());
        assert_eq!(fake.count(FaultOp::Install, "cassandra2", false), 0);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let fake = FakeFaultBackend::new();
        let ctl = controller(&fake);
        let targets = [node("cassandra2")];

        ctl.revoke(&targets).await.unwrap();
        ctl.revoke(&targets).await.unwrap();
        assert!(ctl.read(&targets[0]).await.unwrap().is_clear());
    }

    #[tokio::test]
    async fn partial_install_failure_rolls_back() {
        let fake = FakeFaultBackend::new();
        fake.fail_install_on("cassandra3");
        let ctl = controller(&fake);

        let err = ctl
            .apply(&loss(&["cassandra2", "cassandra3"], "10%"))
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::FaultApply { ref node, .. } if node == "cassandra3"));
        assert!(fake.active_nodes().is_empty());
        // pre-clean + rollback
        assert_eq!(fake.count(FaultOp::Remove, "cassandra2", true), 2);
    }

    #[tokio::test]
    async fn readback_mismatch_is_an_apply_error() {
        let fake = FakeFaultBackend::new();
        fake.ignore_install_on("cassandra2");
        let ctl = controller(&fake);

        let err = ctl.apply(&loss(&["cassandra2"], "10%")).await.unwrap_err();
        match err {
            CampaignError::FaultNotVerified {
                node,
                expected,
                found,
            } => {
                assert_eq!(node, "cassandra2");
                assert_eq!(expected, "loss=10%");
                assert_eq!(found, "none");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn revoke_retries_once() {
        let fake = FakeFaultBackend::new();
        fake.preset("cassandra2", NetemConfig::new().loss(10.0));
        fake.fail_remove_on("cassandra2", 1);
        let ctl = controller(&fake);

        ctl.revoke(&[node("cassandra2")]).await.unwrap();
        assert!(fake.active_nodes().is_empty());
        assert_eq!(fake.count(FaultOp::Remove, "cassandra2", false), 2);
    }

    #[tokio::test]
    async fn revoke_failing_twice_is_reported() {
        let fake = FakeFaultBackend::new();
        fake.preset("cassandra2", NetemConfig::new().loss(10.0));
        fake.fail_remove_on("cassandra2", 2);
        let ctl = controller(&fake);

        let err = ctl.revoke(&[node("cassandra2")]).await.unwrap_err();
        assert!(matches!(err, CampaignError::FaultRevoke { .. }));
        assert!(err.is_revoke_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_install_times_out_and_rolls_back() {
        let fake = FakeFaultBackend::new();
        fake.hang_on("cassandra2", FaultOp::Install);
        let ctl = controller(&fake).with_op_timeout(Duration::from_secs(2));

        let err = ctl.apply(&loss(&["cassandra2"], "10%")).await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::FaultOperationTimeout {
                operation: "apply",
                ..
            }
        ));
        assert!(fake.active_nodes().is_empty());
    }

    #[tokio::test]
    async fn scoped_revokes_after_body_error() {
        let fake = FakeFaultBackend::new();
        let ctl = controller(&fake);
        let spec = loss(&["cassandra2"], "10%");

        let scoped = ctl
            .scoped(&spec, || async {
                assert_eq!(fake.active_nodes(), vec!["cassandra2".to_string()]);
                Err::<(), _>(CampaignError::Halted("body failed".into()))
            })
            .await
            .unwrap();

        assert!(scoped.body.is_err());
        assert!(scoped.revoke.is_ok());
        assert!(fake.active_nodes().is_empty());
    }

    #[tokio::test]
    async fn interface_is_passed_to_install() {
        let fake = FakeFaultBackend::new();
        let ctl = controller(&fake).with_interface("eth1");

        ctl.apply(&loss(&["cassandra2"], "5%")).await.unwrap();
        assert_eq!(fake.active("cassandra2").unwrap().interface, "eth1");
    }
}
