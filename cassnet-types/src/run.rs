//! Run identifiers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ScenarioLabel, TypesError};

/// `YYYYmmdd_HHMMSS`, always 15 characters.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Identifier of one recorded run: `<timestamp>_<label>[.<seq>]`.
///
/// The timestamp has second resolution, so runs with the same label started
/// within the same second are told apart by `seq` (omitted when 1). Labels
/// cannot contain `.`, which keeps the string form unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId {
    timestamp: String,
    label: ScenarioLabel,
    seq: u32,
}

impl RunId {
    /// Build an id for `label` started at `at`, with sequence suffix `seq` (1 = none).
    pub fn new(at: DateTime<Utc>, label: &ScenarioLabel, seq: u32) -> Self {
        Self {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            label: label.clone(),
            seq: seq.max(1),
        }
    }

    /// The same id with a different sequence suffix.
    pub fn with_seq(&self, seq: u32) -> Self {
        Self {
            seq: seq.max(1),
            ..self.clone()
        }
    }

    /// Timestamp part (`YYYYmmdd_HHMMSS`).
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Timestamp as a UTC instant.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Scenario label part.
    pub fn label(&self) -> &ScenarioLabel {
        &self.label
    }

    /// Sequence suffix (1 when the id carries none).
    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seq > 1 {
            write!(f, "{}_{}.{}", self.timestamp, self.label, self.seq)
        } else {
            write!(f, "{}_{}", self.timestamp, self.label)
        }
    }
}

impl FromStr for RunId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidRunId(s.to_string());

        if s.len() <= TIMESTAMP_LEN + 1 || !s.is_char_boundary(TIMESTAMP_LEN) {
            return Err(invalid());
        }
        let (timestamp, rest) = s.split_at(TIMESTAMP_LEN);
        NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
        let rest = rest.strip_prefix('_').ok_or_else(invalid)?;

        let (label, seq) = match rest.rsplit_once('.') {
            Some((label, seq)) => {
                let seq: u32 = seq.parse().map_err(|_| invalid())?;
                if seq < 2 {
                    return Err(invalid());
                }
                (label, seq)
            }
            None => (rest, 1),
        };

        Ok(Self {
            timestamp: timestamp.to_string(),
            label: ScenarioLabel::new(label).map_err(|_| invalid())?,
            seq,
        })
    }
}

impl TryFrom<String> for RunId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn display_without_and_with_seq() {
        let label = ScenarioLabel::new("loss10p").unwrap();
        let id = RunId::new(at(), &label, 1);
        assert_eq!(id.to_string(), "20250314_092653_loss10p");
        assert_eq!(id.with_seq(3).to_string(), "20250314_092653_loss10p.3");
    }

    #[test]
    fn parse_directory_names() {
        let id: RunId = "20250314_092653_loss10p".parse().unwrap();
        assert_eq!(id.label().as_str(), "loss10p");
        assert_eq!(id.seq(), 1);
        assert_eq!(id.started_at(), Some(at()));

        let id: RunId = "20250314_092653_delay_25ms.12".parse().unwrap();
        assert_eq!(id.label().as_str(), "delay_25ms");
        assert_eq!(id.seq(), 12);
    }

    #[test]
    fn reject_foreign_directory_names() {
        for name in [
            "",
            "notes",
            "20250314_092653",
            "20250314_092653_",
            "2025031X_092653_loss",
            "20250314_092653_loss.1",
            "20250314_092653_loss.x",
            "20250314-092653_loss",
        ] {
            assert!(name.parse::<RunId>().is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn ordering_is_timestamp_first() {
        let early: RunId = "20250314_092653_zzz".parse().unwrap();
        let late: RunId = "20250314_092654_aaa".parse().unwrap();
        assert!(early < late);
    }
}
