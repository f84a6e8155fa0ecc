//! Scenarios: one labelled fault + workload step of a campaign.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{FaultSpec, TypesError};

/// Maximum label length; labels end up in directory and file names.
const MAX_LABEL_LEN: usize = 64;

/// A scenario label, restricted to `[A-Za-z0-9_-]`.
///
/// The restriction keeps labels safe inside run directory names and lets a
/// run id be split back into timestamp, label and sequence suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScenarioLabel(String);

impl ScenarioLabel {
    /// Validate and wrap a label.
    pub fn new(label: &str) -> Result<Self, TypesError> {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(label.to_string()))
        } else {
            Err(TypesError::InvalidLabel(label.to_string()))
        }
    }

    /// The label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ScenarioLabel {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ScenarioLabel> for String {
    fn from(label: ScenarioLabel) -> Self {
        label.0
    }
}

impl fmt::Display for ScenarioLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A labelled fault held for a fixed workload duration.
///
/// Immutable once built; a campaign only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    label: ScenarioLabel,
    fault: FaultSpec,
    duration_secs: u64,
}

impl Scenario {
    /// Build a scenario.
    pub fn new(label: &str, fault: FaultSpec, duration_secs: u64) -> Result<Self, TypesError> {
        if duration_secs == 0 {
            return Err(TypesError::ZeroDuration);
        }
        Ok(Self {
            label: ScenarioLabel::new(label)?,
            fault,
            duration_secs,
        })
    }

    /// Scenario label.
    pub fn label(&self) -> &ScenarioLabel {
        &self.label
    }

    /// Fault held during the workload.
    pub fn fault(&self) -> &FaultSpec {
        &self.fault
    }

    /// Workload duration in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
}
