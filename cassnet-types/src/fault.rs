//! Fault specifications and the impairments they install.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{TargetNode, TypesError};

/// Kind of synthetic network impairment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// Random packet loss.
    Loss,
    /// Fixed added latency.
    Delay,
    /// No impairment (baseline run).
    None,
}

impl FaultKind {
    /// Get the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Loss => "loss",
            FaultKind::Delay => "delay",
            FaultKind::None => "none",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loss" => Ok(FaultKind::Loss),
            "delay" => Ok(FaultKind::Delay),
            "none" | "baseline" => Ok(FaultKind::None),
            _ => Err(TypesError::UnknownKind(s.to_string())),
        }
    }
}

/// A parsed, installable impairment.
///
/// This is also what a read-back of the kernel's active qdisc yields, so
/// requested and observed impairments can be compared with [`Impairment::matches`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Impairment {
    /// Packet loss percentage with optional burst correlation.
    Loss {
        /// Loss percentage (0.0-100.0).
        percent: f64,
        /// Correlation percentage for burst loss.
        correlation: Option<f64>,
    },
    /// Added latency with optional jitter.
    Delay {
        /// Delay in microseconds.
        micros: u64,
        /// Jitter in microseconds.
        jitter_micros: Option<u64>,
    },
}

impl Impairment {
    /// Parse a magnitude string for the given kind.
    ///
    /// Loss accepts `10%`, `10`, `0.5%` and `10%:25%` (with correlation).
    /// Delay accepts `25ms`, `1.5ms`, `500us`, `1s`, a bare number of
    /// milliseconds, and `25ms:5ms` (with jitter). `none` yields `Ok(None)`.
    pub fn parse(kind: FaultKind, magnitude: &str) -> Result<Option<Self>, TypesError> {
        let invalid = |reason: &str| TypesError::InvalidMagnitude {
            kind: kind.to_string(),
            magnitude: magnitude.to_string(),
            reason: reason.to_string(),
        };
        let magnitude = magnitude.trim();
        let (primary, secondary) = match magnitude.split_once(':') {
            Some((p, s)) => (p, Some(s)),
            None => (magnitude, None),
        };

        match kind {
            FaultKind::None => {
                if magnitude.is_empty() || magnitude == "0" || magnitude == "-" {
                    Ok(None)
                } else {
                    Err(invalid("baseline takes no magnitude"))
                }
            }
            FaultKind::Loss => {
                let percent = parse_percent(primary).ok_or_else(|| invalid("not a percentage"))?;
                if percent <= 0.0 || percent > 100.0 {
                    return Err(invalid("loss must be above 0% and at most 100%"));
                }
                let correlation = match secondary {
                    Some(s) => {
                        let c = parse_percent(s)
                            .filter(|c| (0.0..=100.0).contains(c))
                            .ok_or_else(|| invalid("bad correlation"))?;
                        Some(c)
                    }
                    None => None,
                };
                Ok(Some(Impairment::Loss {
                    percent,
                    correlation,
                }))
            }
            FaultKind::Delay => {
                let micros =
                    parse_duration_micros(primary).ok_or_else(|| invalid("not a duration"))?;
                // tc omits a zero delay from `qdisc show`, so it could never be verified.
                if micros == 0 {
                    return Err(invalid("delay must be at least 1us"));
                }
                let jitter_micros = match secondary {
                    Some(s) => Some(parse_duration_micros(s).ok_or_else(|| invalid("bad jitter"))?),
                    None => None,
                };
                Ok(Some(Impairment::Delay {
                    micros,
                    jitter_micros,
                }))
            }
        }
    }

    /// Kind of this impairment.
    pub fn kind(&self) -> FaultKind {
        match self {
            Impairment::Loss { .. } => FaultKind::Loss,
            Impairment::Delay { .. } => FaultKind::Delay,
        }
    }

    /// Whether an observed impairment matches this requested one.
    ///
    /// `tc` stores loss as a 32-bit probability and prints delays with three
    /// significant digits, so comparison is tolerant. Jitter and correlation
    /// are not compared.
    pub fn matches(&self, observed: &Impairment) -> bool {
        match (self, observed) {
            (Impairment::Loss { percent: a, .. }, Impairment::Loss { percent: b, .. }) => {
                (a - b).abs() < 0.01
            }
            (Impairment::Delay { micros: a, .. }, Impairment::Delay { micros: b, .. }) => {
                let (a, b) = (*a as f64, *b as f64);
                (a - b).abs() <= (a.max(b) * 0.01).max(1.0)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Impairment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impairment::Loss { percent, .. } => write!(f, "loss={}%", percent),
            Impairment::Delay { micros, .. } => write!(f, "delay={}", format_micros(*micros)),
        }
    }
}

/// Format microseconds the way magnitudes are written (`25ms`, `500us`).
pub(crate) fn format_micros(micros: u64) -> String {
    if micros % 1000 == 0 {
        format!("{}ms", micros / 1000)
    } else {
        format!("{}us", micros)
    }
}

fn parse_percent(s: &str) -> Option<f64> {
    let s = s.trim();
    let number = s.strip_suffix('%').unwrap_or(s);
    number.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Parse `25ms`, `1.5ms`, `500us`, `2s`, `100ns` or a bare millisecond count.
pub(crate) fn parse_duration_micros(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let scale = match unit {
        "" | "ms" => 1_000.0,
        "s" => 1_000_000.0,
        "us" => 1.0,
        "ns" => 0.001,
        _ => return None,
    };
    Some((value * scale).round() as u64)
}

/// A fault to hold on a set of nodes for the duration of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultSpec {
    kind: FaultKind,
    targets: BTreeSet<TargetNode>,
    magnitude: String,
}

impl FaultSpec {
    /// Build a fault spec, validating the magnitude against the kind.
    pub fn new(
        kind: FaultKind,
        targets: impl IntoIterator<Item = TargetNode>,
        magnitude: &str,
    ) -> Result<Self, TypesError> {
        let targets: BTreeSet<TargetNode> = targets.into_iter().collect();
        Impairment::parse(kind, magnitude)?;
        if kind != FaultKind::None && targets.is_empty() {
            return Err(TypesError::EmptyTargets(kind.to_string()));
        }
        Ok(Self {
            kind,
            targets,
            magnitude: magnitude.trim().to_string(),
        })
    }

    /// A baseline (no impairment) spec. Targets are still pre-cleaned.
    pub fn none(targets: impl IntoIterator<Item = TargetNode>) -> Self {
        Self {
            kind: FaultKind::None,
            targets: targets.into_iter().collect(),
            magnitude: String::new(),
        }
    }

    /// Fault kind.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Target nodes.
    pub fn targets(&self) -> &BTreeSet<TargetNode> {
        &self.targets
    }

    /// Magnitude as written.
    pub fn magnitude(&self) -> &str {
        &self.magnitude
    }

    /// Parsed impairment, `None` for a baseline.
    pub fn impairment(&self) -> Result<Option<Impairment>, TypesError> {
        Impairment::parse(self.kind, &self.magnitude)
    }
}

impl fmt::Display for FaultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<&str> = self.targets.iter().map(|t| t.name()).collect();
        match self.kind {
            FaultKind::None => write!(f, "none on [{}]", targets.join(",")),
            kind => write!(f, "{} {} on [{}]", kind, self.magnitude, targets.join(",")),
        }
    }
}
