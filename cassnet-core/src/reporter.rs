//! Summary reporter: a bounded digest per recorded run.
//!
//! Read-only. The run list is taken when [`summarize`] is called; each run's
//! log is only opened when the iterator reaches it, and only its tail is
//! read. The stress digest comes from the metadata written at seal time.
//! Calling [`summarize`] again starts over.

use cassnet_types::RunId;
use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use crate::recorder::{list_runs, RunEntry, RunMetadata, RunStatus};

/// Default number of log lines shown per run.
pub const DEFAULT_TAIL_LINES: usize = 10;

const CHUNK: u64 = 8 * 1024;

/// Whether a run can be trusted as complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryStatus {
    /// Sealed: log and metadata are final.
    Sealed,
    /// Aborted or never finished.
    Incomplete {
        /// Why the run is incomplete.
        reason: String,
    },
}

/// Throughput and latency averaged over `cassandra-stress` interval lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressDigest {
    /// Number of `total,` interval lines.
    pub intervals: usize,
    /// Mean of the per-interval op/s.
    pub mean_ops: f64,
    /// Mean of the per-interval mean latency, in ms.
    pub mean_latency_ms: f64,
}

impl StressDigest {
    /// Digest the `total,` lines of a `cassandra-stress` log.
    ///
    /// Returns `None` when there are none.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Option<Self>> {
        let mut intervals = 0usize;
        let mut ops_sum = 0.0;
        let mut latency_sum = 0.0;

        for line in reader.split(b'\n') {
            let line = line?;
            if let Some((ops, latency)) = parse_total_line(&line) {
                intervals += 1;
                ops_sum += ops;
                latency_sum += latency;
            }
        }

        if intervals == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            intervals,
            mean_ops: ops_sum / intervals as f64,
            mean_latency_ms: latency_sum / intervals as f64,
        }))
    }

    /// Store the digest under `intervals`, `mean_ops` and `mean_latency_ms`.
    pub fn write_to(&self, meta: &mut RunMetadata) {
        meta.set("intervals", self.intervals);
        meta.set("mean_ops", format!("{:.3}", self.mean_ops));
        meta.set("mean_latency_ms", format!("{:.3}", self.mean_latency_ms));
    }

    /// Read back a digest stored by [`write_to`](Self::write_to).
    pub fn from_metadata(meta: &RunMetadata) -> Option<Self> {
        Some(Self {
            intervals: meta.get("intervals")?.parse().ok()?,
            mean_ops: meta.get("mean_ops")?.parse().ok()?,
            mean_latency_ms: meta.get("mean_latency_ms")?.parse().ok()?,
        })
    }
}

/// Parse `total, <ops>, <op/s>, <pk/s>, <row/s>, <mean>, ...` into
/// (op/s, mean latency).
pub fn parse_total_line(line: &[u8]) -> Option<(f64, f64)> {
    let line = std::str::from_utf8(line).ok()?;
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 7 || fields[0] != "total" {
        return None;
    }
    fields[1].parse::<u64>().ok()?;
    fields[3].parse::<u64>().ok()?;
    fields[4].parse::<u64>().ok()?;
    let ops: f64 = fields[2].parse().ok()?;
    let mean: f64 = fields[5].parse().ok()?;
    Some((ops, mean))
}

/// Digest of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run id.
    pub id: RunId,
    /// Scenario label.
    pub label: String,
    /// Sealed or incomplete.
    pub status: SummaryStatus,
    /// Raw bytes of the last lines of the log.
    pub tail: Vec<u8>,
    /// Stress digest recorded at seal time, if the log had interval lines.
    pub digest: Option<StressDigest>,
}

impl RunSummary {
    /// One-line header printed above the tail.
    pub fn header(&self) -> String {
        let status = match &self.status {
            SummaryStatus::Sealed => "sealed".to_string(),
            SummaryStatus::Incomplete { reason } => format!("incomplete: {}", reason),
        };
        let mut header = format!("== {} [{}]", self.id, status);
        if let Some(d) = &self.digest {
            header.push_str(&format!(
                " intervals={} op/s={:.1} mean={:.2}ms",
                d.intervals, d.mean_ops, d.mean_latency_ms
            ));
        }
        header
    }
}

/// Iterator over run summaries, oldest run first.
#[derive(Debug)]
pub struct Summaries {
    entries: std::vec::IntoIter<RunEntry>,
    lines: usize,
}

impl Iterator for Summaries {
    type Item = RunSummary;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        Some(summarize_run(&entry, self.lines))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// Summaries of every run under `root`, with the last `lines` log lines each.
pub fn summarize(root: &Path, lines: usize) -> io::Result<Summaries> {
    Ok(Summaries {
        entries: list_runs(root)?.into_iter(),
        lines,
    })
}

fn summarize_run(entry: &RunEntry, lines: usize) -> RunSummary {
    let mut status = match &entry.status {
        RunStatus::Sealed => SummaryStatus::Sealed,
        RunStatus::Aborted(reason) => SummaryStatus::Incomplete {
            reason: reason.clone(),
        },
        RunStatus::Open => SummaryStatus::Incomplete {
            reason: "not sealed".to_string(),
        },
    };

    let tail = match entry.log_path() {
        Some(path) => tail_lines(&path, lines).unwrap_or_else(|e| {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            Vec::new()
        }),
        None => {
            if status == SummaryStatus::Sealed {
                status = SummaryStatus::Incomplete {
                    reason: "log missing".to_string(),
                };
            }
            Vec::new()
        }
    };

    let digest = match status {
        SummaryStatus::Sealed => match entry.metadata() {
            Ok(meta) => StressDigest::from_metadata(&meta),
            Err(e) => {
                tracing::warn!("Cannot read metadata of {}: {}", entry.id, e);
                None
            }
        },
        SummaryStatus::Incomplete { .. } => None,
    };

    RunSummary {
        id: entry.id.clone(),
        label: entry.id.label().to_string(),
        status,
        tail,
        digest,
    }
}

/// The last `n` lines of a file, byte for byte.
///
/// A trailing newline ends the last line rather than starting an empty one.
/// Reads backwards from the end, so only the tail is touched.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if n == 0 || len == 0 {
        return Ok(Vec::new());
    }

    let mut start = 0u64;
    let mut newlines = 0usize;
    let mut pos = len;
    let mut chunk = vec![0u8; CHUNK as usize];

    'scan: while pos > 0 {
        let size = CHUNK.min(pos);
        pos -= size;
        file.seek(SeekFrom::Start(pos))?;
        let buf = &mut chunk[..size as usize];
        file.read_exact(buf)?;

        for (i, byte) in buf.iter().enumerate().rev() {
            let offset = pos + i as u64;
            if *byte == b'\n' && offset != len - 1 {
                newlines += 1;
                if newlines == n {
                    start = offset + 1;
                    break 'scan;
                }
            }
        }
    }

    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut tail)?;
    Ok(tail)
}
