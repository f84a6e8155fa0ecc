//! Live-cluster scenarios.
//!
//! Bring up `docker-compose.cassandra.yml`, so they need Docker and a few
//! minutes. All tests: `#[ignore = "requires docker"]`, run one at a time.
//!
//! Run: `cargo test -p cluster-tests live -- --ignored`

// Helpers only used by #[ignore] tests
#![allow(dead_code, unused_imports)]

use cassnet_core::{summarize, CancelSignal, SummaryStatus};
use cassnet_types::{FaultKind, FaultSpec, Scenario};
use serial_test::serial;

use crate::harness::LiveCluster;

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn apply_read_revoke_on_two_peers() {
    let cluster = LiveCluster::start().await.expect("cluster start failed");
    let campaign = cluster.campaign().expect("docker connect failed");
    let controller = campaign.controller();

    let peers: Vec<_> = cluster
        .session()
        .nodes()
        .iter()
        .filter(|n| !n.is_seed())
        .cloned()
        .collect();
    let spec = FaultSpec::new(FaultKind::Loss, peers.clone(), "10%").unwrap();

    controller.apply(&spec).await.expect("apply failed");
    for node in &peers {
        let active = controller.read(node).await.expect("read failed");
        assert!(!active.is_clear(), "{} should be impaired", node.name());
    }

    controller.revoke(&peers).await.expect("revoke failed");
    controller.revoke(&peers).await.expect("second revoke should be a no-op");
    for node in &peers {
        assert!(controller.read(node).await.unwrap().is_clear());
    }

    cluster.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn short_delay_scenario_is_recorded() {
    let cluster = LiveCluster::start().await.expect("cluster start failed");
    let mut campaign = cluster.campaign().expect("docker connect failed");

    let peers: Vec<_> = cluster
        .session()
        .nodes()
        .iter()
        .filter(|n| !n.is_seed())
        .cloned()
        .collect();
    campaign
        .enqueue(
            Scenario::new(
                "delay_5ms",
                FaultSpec::new(FaultKind::Delay, peers, "5ms").unwrap(),
                20,
            )
            .unwrap(),
        )
        .unwrap();

    let report = campaign.run(&CancelSignal::never()).await;
    assert_eq!(report.exit_code(), 0, "{}", report.summary());

    let summaries: Vec<_> = summarize(cluster.storage(), 5).unwrap().collect();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, SummaryStatus::Sealed);
    assert!(summaries[0].digest.is_some(), "no interval lines in the log");

    cluster.cleanup().await.expect("cleanup failed");
}
