//! Assertion helpers for campaign timelines.
//!
//! Pure functions over what the fakes recorded. Each returns pass/fail with
//! details instead of panicking, so a test can report every broken property.

use cassnet_core::backend::{FaultEvent, FaultOp};
use cassnet_core::NetemConfig;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// At no point are two scenarios' impairments active at once.
///
/// Replays the event log. Installs between two prepare/remove calls form one
/// apply batch. Every successful install must find the other active nodes
/// installed by the same batch with the same config, and nothing may be
/// active at the end.
pub fn assert_fault_windows_disjoint(events: &[FaultEvent]) -> AssertionResult {
    let description = "Fault windows do not overlap";
    let mut active: HashMap<&str, (&NetemConfig, usize)> = HashMap::new();
    let mut batch = 0usize;

    for (i, event) in events.iter().enumerate() {
        if matches!(event.op, FaultOp::Prepare | FaultOp::Remove) {
            batch = i;
        }
        if !event.ok {
            continue;
        }
        match event.op {
            FaultOp::Install => {
                let Some(netem) = &event.netem else {
                    return AssertionResult::fail(description, &format!("event {} has no config", i));
                };
                if let Some((node, (other, _))) = active
                    .iter()
                    .find(|(_, (other, since))| *since != batch || *other != netem)
                {
                    return AssertionResult::fail(
                        description,
                        &format!(
                            "event {}: {} installed {} while {} still had {}",
                            i,
                            event.node,
                            netem.to_tc_command(),
                            node,
                            other.to_tc_command()
                        ),
                    );
                }
                active.insert(event.node.as_str(), (netem, batch));
            }
            FaultOp::Remove => {
                active.remove(event.node.as_str());
            }
            FaultOp::Prepare | FaultOp::Show => {}
        }
    }

    if active.is_empty() {
        AssertionResult::pass(description)
    } else {
        let mut left: Vec<&str> = active.keys().copied().collect();
        left.sort_unstable();
        AssertionResult::fail(
            description,
            &format!("still impaired at the end: {}", left.join(", ")),
        )
    }
}

/// Every node saw at least as many successful removes as successful installs.
pub fn assert_revokes_cover_applies(events: &[FaultEvent]) -> AssertionResult {
    let description = "Revokes >= applies on every node";
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.ok) {
        let entry = counts.entry(event.node.as_str()).or_default();
        match event.op {
            FaultOp::Install => entry.0 += 1,
            FaultOp::Remove => entry.1 += 1,
            _ => {}
        }
    }

    let short: Vec<String> = counts
        .iter()
        .filter(|(_, (installs, removes))| removes < installs)
        .map(|(node, (installs, removes))| {
            format!("{}: {} installs, {} removes", node, installs, removes)
        })
        .collect();

    if short.is_empty() {
        AssertionResult::pass(description)
    } else {
        AssertionResult::fail(description, &short.join("; "))
    }
}

/// Workload runs never overlap in time.
pub fn assert_workloads_sequential(windows: &[(Instant, Instant)]) -> AssertionResult {
    let description = "Workload runs are sequential";
    for (i, pair) in windows.windows(2).enumerate() {
        let (_, prev_end) = pair[0];
        let (next_start, _) = pair[1];
        if next_start < prev_end {
            return AssertionResult::fail(
                description,
                &format!("run {} started before run {} ended", i + 1, i),
            );
        }
    }
    AssertionResult::pass(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(op: FaultOp, node: &str, netem: Option<NetemConfig>) -> FaultEvent {
        FaultEvent {
            op,
            node: node.into(),
            at: Instant::now(),
            ok: true,
            netem,
        }
    }

    #[test]
    fn disjoint_windows_pass() {
        let loss = NetemConfig::new().loss(10.0);
        let delay = NetemConfig::new().delay(25);
        let events = vec![
            event(FaultOp::Install, "a", Some(loss.clone())),
            event(FaultOp::Install, "b", Some(loss)),
            event(FaultOp::Remove, "a", None),
            event(FaultOp::Remove, "b", None),
            event(FaultOp::Install, "a", Some(delay)),
            event(FaultOp::Remove, "a", None),
        ];
        assert!(assert_fault_windows_disjoint(&events).passed);
        assert!(assert_revokes_cover_applies(&events).passed);
    }

    #[test]
    fn overlapping_windows_fail() {
        let events = vec![
            event(FaultOp::Install, "a", Some(NetemConfig::new().loss(10.0))),
            event(FaultOp::Install, "b", Some(NetemConfig::new().delay(25))),
        ];
        let result = assert_fault_windows_disjoint(&events);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("still had"));
    }

    #[test]
    fn same_config_leaked_into_next_scenario_fails() {
        let loss = NetemConfig::new().loss(10.0);
        let events = vec![
            event(FaultOp::Prepare, "a", None),
            event(FaultOp::Install, "a", Some(loss.clone())),
            event(FaultOp::Show, "a", None),
            // next scenario targets b; a was never revoked
            event(FaultOp::Prepare, "b", None),
            event(FaultOp::Remove, "b", None),
            event(FaultOp::Install, "b", Some(loss)),
            event(FaultOp::Remove, "b", None),
            event(FaultOp::Remove, "a", None),
        ];
        let result = assert_fault_windows_disjoint(&events);
        assert!(!result.passed);
        assert!(result
            .failure_details
            .unwrap()
            .starts_with("event 5: b installed"));
    }

    #[test]
    fn reinstalling_on_the_same_node_requires_a_remove() {
        let loss = NetemConfig::new().loss(10.0);
        let events = vec![
            event(FaultOp::Install, "a", Some(loss.clone())),
            event(FaultOp::Prepare, "a", None),
            event(FaultOp::Install, "a", Some(loss)),
            event(FaultOp::Remove, "a", None),
        ];
        assert!(!assert_fault_windows_disjoint(&events).passed);
    }

    #[test]
    fn leaked_fault_fails_both() {
        let events = vec![event(FaultOp::Install, "a", Some(NetemConfig::new().loss(10.0)))];
        assert!(!assert_fault_windows_disjoint(&events).passed);
        let result = assert_revokes_cover_applies(&events);
        assert!(!result.passed);
        assert_eq!(
            result.failure_details.as_deref(),
            Some("a: 1 installs, 0 removes")
        );
    }

    #[test]
    fn sequential_workloads() {
        let t0 = Instant::now();
        let s = Duration::from_secs(1);
        assert!(assert_workloads_sequential(&[(t0, t0 + s), (t0 + s, t0 + 2 * s)]).passed);
        assert!(!assert_workloads_sequential(&[(t0, t0 + 2 * s), (t0 + s, t0 + 3 * s)]).passed);
    }
}
