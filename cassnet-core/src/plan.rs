//! Campaign plans: built-in sweeps, scenario list files and target selection.
//!
//! A scenario list file is TOML:
//!
//! ```toml
//! duration_secs = 90
//!
//! [[scenario]]
//! label = "baseline"
//! kind = "none"
//!
//! [[scenario]]
//! label = "loss_20pct"
//! kind = "loss"
//! magnitude = "20%"
//! targets = "random:1"
//! duration_secs = 60
//! ```
//!
//! `targets` is `peers` (the default), `all`, `random:<k>`, a comma-separated
//! list, or an array of node names. Random targets are drawn once, when the
//! plan is loaded, so the resulting scenarios never change afterwards.

use cassnet_types::{FaultKind, FaultSpec, Scenario, TargetNode};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::config::ConfigError;

/// Loss percentages of the built-in loss sweep, after the baseline.
pub const LOSS_SWEEP: &[u32] = &[10, 20, 30, 50];

/// Delays in milliseconds of the built-in delay sweep, after the baseline.
pub const DELAY_SWEEP_MS: &[u64] = &[1, 2, 5, 10, 25, 50, 75, 100];

/// Which nodes a fault lands on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Every non-seed node.
    Peers,
    /// Every node.
    All,
    /// `k` peers drawn uniformly at random.
    Random(usize),
    /// Named nodes.
    Named(Vec<String>),
}

impl FromStr for TargetSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "peers" => return Ok(TargetSelector::Peers),
            "all" => return Ok(TargetSelector::All),
            _ => {}
        }
        if let Some(k) = s.strip_prefix("random:") {
            let k: usize = k
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad random target count: {}", s)))?;
            return Ok(TargetSelector::Random(k));
        }
        let names: Vec<String> = s
            .split(',')
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err(ConfigError::Invalid("no targets given".into()));
        }
        Ok(TargetSelector::Named(names))
    }
}

impl TargetSelector {
    /// Resolve against the cluster's members.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        cluster: &[TargetNode],
        rng: &mut R,
    ) -> Result<Vec<TargetNode>, ConfigError> {
        let peers: Vec<TargetNode> = cluster.iter().filter(|n| !n.is_seed()).cloned().collect();
        match self {
            TargetSelector::Peers => Ok(peers),
            TargetSelector::All => Ok(cluster.to_vec()),
            TargetSelector::Random(k) => {
                if *k == 0 || *k > peers.len() {
                    return Err(ConfigError::Invalid(format!(
                        "random:{} needs between 1 and {} peers",
                        k,
                        peers.len()
                    )));
                }
                let mut chosen: Vec<TargetNode> =
                    peers.choose_multiple(rng, *k).cloned().collect();
                chosen.sort();
                Ok(chosen)
            }
            TargetSelector::Named(names) => names
                .iter()
                .map(|name| {
                    cluster
                        .iter()
                        .find(|n| n.name() == name)
                        .cloned()
                        .ok_or_else(|| ConfigError::Invalid(format!("unknown node {:?}", name)))
                })
                .collect(),
        }
    }
}

/// A built-in parameter sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Baseline, then 10, 20, 30 and 50% loss.
    Loss,
    /// Baseline, then 1 to 100 ms of added latency.
    Delay,
}

impl FromStr for Sweep {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loss" => Ok(Sweep::Loss),
            "delay" => Ok(Sweep::Delay),
            other => Err(ConfigError::Invalid(format!("unknown sweep {:?}", other))),
        }
    }
}

impl Sweep {
    /// Scenarios of the sweep, baseline first, each held for `duration_secs`.
    pub fn scenarios(
        &self,
        targets: &[TargetNode],
        duration_secs: u64,
    ) -> Result<Vec<Scenario>, ConfigError> {
        let mut scenarios = vec![Scenario::new(
            "baseline",
            FaultSpec::none(targets.iter().cloned()),
            duration_secs,
        )?];

        let steps: Vec<(String, FaultSpec)> = match self {
            Sweep::Loss => LOSS_SWEEP
                .iter()
                .map(|pct| -> Result<(String, FaultSpec), ConfigError> {
                    let spec =
                        FaultSpec::new(FaultKind::Loss, targets.iter().cloned(), &format!("{}%", pct))?;
                    Ok((format!("loss_{}pct", pct), spec))
                })
                .collect::<Result<_, _>>()?,
            Sweep::Delay => DELAY_SWEEP_MS
                .iter()
                .map(|ms| -> Result<(String, FaultSpec), ConfigError> {
                    let spec =
                        FaultSpec::new(FaultKind::Delay, targets.iter().cloned(), &format!("{}ms", ms))?;
                    Ok((format!("delay_{}ms", ms), spec))
                })
                .collect::<Result<_, _>>()?,
        };

        for (label, spec) in steps {
            scenarios.push(Scenario::new(&label, spec, duration_secs)?);
        }
        Ok(scenarios)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetsField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ScenarioEntry {
    label: String,
    kind: String,
    #[serde(default)]
    magnitude: String,
    #[serde(default)]
    targets: Option<TargetsField>,
    #[serde(default)]
    duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    duration_secs: Option<u64>,
    #[serde(default, rename = "scenario")]
    scenarios: Vec<ScenarioEntry>,
}

/// Parse a scenario list, resolving targets against `cluster`.
pub fn parse_plan<R: Rng + ?Sized>(
    content: &str,
    cluster: &[TargetNode],
    default_duration_secs: u64,
    rng: &mut R,
) -> Result<Vec<Scenario>, ConfigError> {
    let file: PlanFile = toml::from_str(content)
        .map_err(|e| ConfigError::Invalid(format!("scenario list: {}", e)))?;
    if file.scenarios.is_empty() {
        return Err(ConfigError::Invalid("scenario list has no [[scenario]] entries".into()));
    }
    let file_duration = file.duration_secs.unwrap_or(default_duration_secs);

    file.scenarios
        .into_iter()
        .map(|entry| -> Result<Scenario, ConfigError> {
            let selector = match entry.targets {
                None => TargetSelector::Peers,
                Some(TargetsField::One(s)) => s.parse()?,
                Some(TargetsField::Many(names)) => TargetSelector::Named(names),
            };
            let targets = selector.resolve(cluster, &mut *rng)?;
            let kind: FaultKind = entry.kind.parse()?;
            let fault = FaultSpec::new(kind, targets, &entry.magnitude)?;
            let duration = entry.duration_secs.unwrap_or(file_duration);
            Ok(Scenario::new(&entry.label, fault, duration)?)
        })
        .collect()
}

/// Load a scenario list file.
pub fn load_plan<R: Rng + ?Sized>(
    path: &Path,
    cluster: &[TargetNode],
    default_duration_secs: u64,
    rng: &mut R,
) -> Result<Vec<Scenario>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_plan(&content, cluster, default_duration_secs, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassnet_types::NodeRole;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cluster() -> Vec<TargetNode> {
        vec![
            TargetNode::new("cassandra1", NodeRole::Seed).unwrap(),
            TargetNode::new("cassandra2", NodeRole::Peer).unwrap(),
            TargetNode::new("cassandra3", NodeRole::Peer).unwrap(),
        ]
    }

    fn names(nodes: &[TargetNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name()).collect()
    }

    #[test]
    fn selectors_parse() {
        assert_eq!("peers".parse::<TargetSelector>().unwrap(), TargetSelector::Peers);
        assert_eq!("random:2".parse::<TargetSelector>().unwrap(), TargetSelector::Random(2));
        assert_eq!(
            "cassandra2, cassandra3".parse::<TargetSelector>().unwrap(),
            TargetSelector::Named(vec!["cassandra2".into(), "cassandra3".into()])
        );
        assert!("random:x".parse::<TargetSelector>().is_err());
        assert!(" , ".parse::<TargetSelector>().is_err());
    }

    #[test]
    fn random_selection_draws_from_peers() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let chosen = TargetSelector::Random(1).resolve(&cluster(), &mut rng).unwrap();
            assert_eq!(chosen.len(), 1);
            assert!(!chosen[0].is_seed());
        }
        let both = TargetSelector::Random(2).resolve(&cluster(), &mut rng).unwrap();
        assert_eq!(names(&both), vec!["cassandra2", "cassandra3"]);
        assert!(TargetSelector::Random(3).resolve(&cluster(), &mut rng).is_err());
    }

    #[test]
    fn named_selection_keeps_roles() {
        let mut rng = StdRng::seed_from_u64(1);
        let nodes = TargetSelector::Named(vec!["cassandra1".into()])
            .resolve(&cluster(), &mut rng)
            .unwrap();
        assert!(nodes[0].is_seed());
        assert!(TargetSelector::Named(vec!["cassandra9".into()])
            .resolve(&cluster(), &mut rng)
            .is_err());
    }

    #[test]
    fn loss_sweep() {
        let peers = &cluster()[1..];
        let scenarios = Sweep::Loss.scenarios(peers, 90).unwrap();
        let labels: Vec<&str> = scenarios.iter().map(|s| s.label().as_str()).collect();
        assert_eq!(
            labels,
            vec!["baseline", "loss_10pct", "loss_20pct", "loss_30pct", "loss_50pct"]
        );
        assert_eq!(scenarios[0].fault().kind(), FaultKind::None);
        assert_eq!(scenarios[2].fault().magnitude(), "20%");
        assert_eq!(scenarios[2].fault().targets().len(), 2);
    }

    #[test]
    fn delay_sweep() {
        let scenarios = Sweep::Delay.scenarios(&cluster()[1..], 90).unwrap();
        assert_eq!(scenarios.len(), 9);
        assert_eq!(scenarios[1].label().as_str(), "delay_1ms");
        assert_eq!(scenarios[8].fault().magnitude(), "100ms");
        assert!(scenarios.iter().all(|s| s.duration_secs() == 90));
    }

    #[test]
    fn plan_file_parses() {
        let content = r#"
duration_secs = 60

[[scenario]]
label = "baseline"
kind = "baseline"

[[scenario]]
label = "delay_25ms"
kind = "delay"
magnitude = "25ms:5ms"
targets = ["cassandra3"]
duration_secs = 30

[[scenario]]
label = "loss_one"
kind = "loss"
magnitude = "20%"
targets = "random:1"
"#;
        let mut rng = StdRng::seed_from_u64(3);
        let plan = parse_plan(content, &cluster(), 90, &mut rng).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].duration_secs(), 60);
        assert_eq!(plan[0].fault().targets().len(), 2);
        assert_eq!(plan[1].duration_secs(), 30);
        assert_eq!(
            plan[1].fault().targets().iter().next().unwrap().name(),
            "cassandra3"
        );
        assert_eq!(plan[2].fault().targets().len(), 1);
    }

    #[test]
    fn plan_file_errors() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(parse_plan("", &cluster(), 90, &mut rng).is_err());

        let bad_magnitude = "[[scenario]]\nlabel = \"x\"\nkind = \"loss\"\nmagnitude = \"150%\"\n";
        assert!(matches!(
            parse_plan(bad_magnitude, &cluster(), 90, &mut rng),
            Err(ConfigError::Types(_))
        ));

        let bad_label = "[[scenario]]\nlabel = \"a b\"\nkind = \"none\"\n";
        assert!(parse_plan(bad_label, &cluster(), 90, &mut rng).is_err());
    }

    #[test]
    fn shipped_plan_parses() {
        let content = include_str!("../../plans/loss-and-delay.toml");
        let mut rng = StdRng::seed_from_u64(11);
        let plan = parse_plan(content, &cluster(), 90, &mut rng).unwrap();
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[2].fault().targets().len(), 1);
        assert_eq!(plan[4].duration_secs(), 30);
    }
}
