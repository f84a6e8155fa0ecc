//! Whole campaigns over the fakes: ordering, cleanup and recording.

use cassnet_core::backend::FaultOp;
use cassnet_core::{
    cancel_pair, summarize, CancelSignal, CampaignError, FakeWorkload, FakeWorkloadBackend,
    RunStatus, SummaryStatus, Sweep,
};
use cassnet_types::{FaultKind, FaultSpec, Scenario, ScenarioState};
use std::time::Duration;

use crate::assertions::{
    assert_fault_windows_disjoint, assert_revokes_cover_applies, assert_workloads_sequential,
};
use crate::harness::FakeCluster;

fn succeed(secs: u64) -> FakeWorkload {
    FakeWorkload::Succeed {
        output: FakeWorkloadBackend::default_output(),
        after: Duration::from_secs(secs),
    }
}

fn check_timeline(cluster: &FakeCluster) {
    let events = cluster.faults.events();
    for result in [
        assert_fault_windows_disjoint(&events),
        assert_revokes_cover_applies(&events),
        assert_workloads_sequential(&cluster.workload.windows()),
    ] {
        assert!(
            result.passed,
            "{}: {:?}",
            result.description, result.failure_details
        );
    }
}

#[tokio::test(start_paused = true)]
async fn loss_sweep_runs_in_order_and_cleans_up() {
    let cluster = FakeCluster::new().unwrap();
    for _ in 0..5 {
        cluster.workload.push(succeed(10));
    }

    let mut campaign = cluster.campaign();
    campaign
        .enqueue_all(Sweep::Loss.scenarios(&cluster.peers(), 10).unwrap())
        .unwrap();
    let report = campaign.run(&CancelSignal::never()).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.done().count(), 5);
    check_timeline(&cluster);
    assert!(cluster.faults.active_nodes().is_empty());

    // Seed is never impaired by a peers sweep.
    assert_eq!(cluster.faults.count(FaultOp::Install, "cassandra1", false), 0);
    assert_eq!(cluster.faults.count(FaultOp::Install, "cassandra2", true), 4);
}

#[tokio::test(start_paused = true)]
async fn mixed_failures_keep_properties() {
    let cluster = FakeCluster::new().unwrap();
    cluster.faults.fail_install_on("cassandra3");
    cluster.workload.push(succeed(3));
    cluster.workload.push(FakeWorkload::Fail {
        output: b"java.io.IOException: Operation x10 on key(s) failed\n".to_vec(),
        exit_code: 1,
        after: Duration::from_secs(2),
    });
    cluster.workload.push(FakeWorkload::Hang {
        output: b"total, 10, 10, 10, 10, 800.0, 700.0\n".to_vec(),
    });

    let peer = |name: &str| cluster.nodes().iter().find(|n| n.name() == name).cloned().unwrap();
    let delay = |label: &str, node: &str, ms: &str| {
        Scenario::new(
            label,
            FaultSpec::new(FaultKind::Delay, [peer(node)], ms).unwrap(),
            3,
        )
        .unwrap()
    };

    let mut campaign = cluster.campaign();
    campaign.enqueue(delay("ok", "cassandra2", "10ms")).unwrap();
    campaign.enqueue(delay("unreachable", "cassandra3", "10ms")).unwrap();
    campaign.enqueue(delay("crashes", "cassandra2", "25ms")).unwrap();
    campaign.enqueue(delay("hangs", "cassandra2", "50ms")).unwrap();
    campaign.enqueue(delay("last", "cassandra2", "75ms")).unwrap();
    let report = campaign.run(&CancelSignal::never()).await;

    let states: Vec<ScenarioState> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![
            ScenarioState::Done,
            ScenarioState::Aborted,
            ScenarioState::Aborted,
            ScenarioState::Aborted,
            ScenarioState::Done,
        ]
    );
    assert!(matches!(report.outcomes[1].error, Some(CampaignError::FaultApply { .. })));
    assert!(matches!(
        report.outcomes[2].error,
        Some(CampaignError::WorkloadExecution { exit_code: Some(1), .. })
    ));
    assert!(matches!(report.outcomes[3].error, Some(CampaignError::WorkloadTimeout { .. })));
    assert_eq!(report.exit_code(), 3);
    assert!(report.halted.is_none());
    check_timeline(&cluster);

    // The failed apply never started a workload.
    assert_eq!(cluster.workload.runs().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn recorded_runs_summarize_oldest_first() {
    let cluster = FakeCluster::new().unwrap();
    cluster.workload.push(succeed(1));
    cluster.workload.push(FakeWorkload::Hang {
        output: b"partial line 1\npartial line 2\n".to_vec(),
    });

    let mut campaign = cluster.campaign();
    campaign
        .enqueue_all(Sweep::Delay.scenarios(&cluster.peers(), 2).unwrap().into_iter().take(2))
        .unwrap();
    let report = campaign.run(&CancelSignal::never()).await;
    assert_eq!(report.exit_code(), 1);

    let summaries: Vec<_> = summarize(cluster.storage(), 1).unwrap().collect();
    assert_eq!(summaries.len(), 2);

    assert_eq!(summaries[0].label, "baseline");
    assert_eq!(summaries[0].status, SummaryStatus::Sealed);
    assert_eq!(
        summaries[0].tail,
        b"total,         27000,    8800,    8800,    8800,     5.7,     5.0\n".to_vec()
    );
    assert_eq!(summaries[0].digest.unwrap().intervals, 3);

    assert_eq!(summaries[1].label, "delay_1ms");
    assert!(matches!(summaries[1].status, SummaryStatus::Incomplete { .. }));
    assert_eq!(summaries[1].tail, b"partial line 2\n".to_vec());

    // Summarizing is read-only and repeatable.
    assert_eq!(summarize(cluster.storage(), 1).unwrap().count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_campaign_and_revokes() {
    let cluster = FakeCluster::new().unwrap().with_grace(Duration::from_secs(30));
    for _ in 0..5 {
        cluster.workload.push(succeed(60));
    }

    let mut campaign = cluster.campaign();
    campaign
        .enqueue_all(Sweep::Loss.scenarios(&cluster.peers(), 60).unwrap())
        .unwrap();

    let (handle, signal) = cancel_pair();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.cancel();
    });
    let report = campaign.run(&signal).await;
    canceller.await.unwrap();

    let states: Vec<ScenarioState> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states[0], ScenarioState::Done);
    assert!(matches!(
        report.outcomes[1].error,
        Some(CampaignError::WorkloadCancelled { .. })
    ));
    assert!(states[2..].iter().all(|s| *s == ScenarioState::Aborted));
    assert!(report.halted.is_some());
    assert_eq!(report.exit_code(), 4);

    check_timeline(&cluster);
    let runs = cluster.campaign().recorder().list().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(matches!(runs[1].status, RunStatus::Aborted(_)));
}
