//! `tc netem` command builder and read-back parser.
//!
//! Builds `tc qdisc` commands for injecting latency and packet loss via
//! Linux traffic control, and parses `tc qdisc show` output back into
//! [`Impairment`]s so an install can be verified.
//! Requires `iproute2` in the container and `NET_ADMIN` capability.

use cassnet_types::{FaultKind, Impairment};

/// Interface the cluster containers route through.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Network emulation configuration for `tc netem`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetemConfig {
    /// Fixed delay in microseconds.
    pub delay_us: Option<u64>,
    /// Jitter in microseconds (requires delay_us).
    pub jitter_us: Option<u64>,
    /// Packet loss percentage (0.0–100.0).
    pub loss_percent: Option<f64>,
    /// Loss correlation percentage (0.0–100.0) for burst loss patterns.
    pub loss_correlation: Option<f64>,
    /// Network interface to apply rules to.
    pub interface: String,
}

impl NetemConfig {
    /// Create a new NetemConfig for the default `eth0` interface.
    pub fn new() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.into(),
            ..Default::default()
        }
    }

    /// Build the config that installs `impairment` on `interface`.
    pub fn from_impairment(interface: &str, impairment: &Impairment) -> Self {
        let config = Self::new().interface(interface);
        match impairment {
            Impairment::Loss {
                percent,
                correlation,
            } => {
                let config = config.loss(*percent);
                match correlation {
                    Some(c) => config.loss_correlation(*c),
                    None => config,
                }
            }
            Impairment::Delay {
                micros,
                jitter_micros,
            } => {
                let config = config.delay_us(*micros);
                match jitter_micros {
                    Some(j) => config.jitter_us(*j),
                    None => config,
                }
            }
        }
    }

    /// Set the network interface.
    pub fn interface(mut self, iface: &str) -> Self {
        self.interface = iface.into();
        self
    }

    /// Add fixed latency in milliseconds.
    pub fn delay(self, ms: u64) -> Self {
        self.delay_us(ms * 1000)
    }

    /// Add fixed latency in microseconds.
    pub fn delay_us(mut self, us: u64) -> Self {
        self.delay_us = Some(us);
        self
    }

    /// Add jitter in microseconds (requires delay).
    pub fn jitter_us(mut self, us: u64) -> Self {
        self.jitter_us = Some(us);
        self
    }

    /// Add packet loss.
    pub fn loss(mut self, percent: f64) -> Self {
        self.loss_percent = Some(percent);
        self
    }

    /// Add loss correlation for burst patterns.
    pub fn loss_correlation(mut self, percent: f64) -> Self {
        self.loss_correlation = Some(percent);
        self
    }

    /// Build the `tc qdisc replace` command arguments.
    ///
    /// `replace` installs or overwrites the root qdisc, so a stale netem left
    /// by a crashed run never makes the install fail.
    pub fn to_tc_replace_args(&self) -> Vec<String> {
        let mut args = vec![
            "qdisc".into(),
            "replace".into(),
            "dev".into(),
            self.interface.clone(),
            "root".into(),
            "netem".into(),
        ];

        if let Some(delay) = self.delay_us {
            args.push("delay".into());
            args.push(format_us(delay));

            if let Some(jitter) = self.jitter_us {
                args.push(format_us(jitter));
            }
        }

        if let Some(loss) = self.loss_percent {
            args.push("loss".into());
            args.push(format!("{}%", loss));

            if let Some(corr) = self.loss_correlation {
                args.push(format!("{}%", corr));
            }
        }

        args
    }

    /// Build the `tc qdisc del` command arguments for clearing rules.
    ///
    /// Returns args for: `tc qdisc del dev <iface> root`
    pub fn to_tc_del_args(&self) -> Vec<String> {
        vec![
            "qdisc".into(),
            "del".into(),
            "dev".into(),
            self.interface.clone(),
            "root".into(),
        ]
    }

    /// Build the `tc qdisc show` command arguments for read-back.
    pub fn to_tc_show_args(&self) -> Vec<String> {
        vec![
            "qdisc".into(),
            "show".into(),
            "dev".into(),
            self.interface.clone(),
        ]
    }

    /// Build the full `tc` command string (for logging/debugging).
    pub fn to_tc_command(&self) -> String {
        let args = self.to_tc_replace_args();
        format!("tc {}", args.join(" "))
    }

    /// Render the line `tc qdisc show` prints for this config.
    ///
    /// Used by in-memory backends to mimic the kernel, which leaves out
    /// zero-valued parameters.
    pub fn to_show_line(&self) -> String {
        let mut line = "qdisc netem 8001: root refcnt 2 limit 1000".to_string();
        if let Some(delay) = self.delay_us.filter(|d| *d > 0) {
            line.push_str(&format!(" delay {}", format_us(delay)));
            if let Some(jitter) = self.jitter_us {
                line.push_str(&format!("  {}", format_us(jitter)));
            }
        }
        if let Some(loss) = self.loss_percent.filter(|l| *l > 0.0) {
            line.push_str(&format!(" loss {}%", loss));
            if let Some(corr) = self.loss_correlation {
                line.push_str(&format!(" {}%", corr));
            }
        }
        line
    }
}

fn format_us(us: u64) -> String {
    if us % 1000 == 0 {
        format!("{}ms", us / 1000)
    } else {
        format!("{}us", us)
    }
}

/// Line `tc qdisc show` prints for an interface with no netem installed.
pub const NO_QDISC_LINE: &str = "qdisc noqueue 0: root refcnt 2";

/// Parse `tc qdisc show dev <iface>` output into the active impairments.
///
/// Only the root netem qdisc is considered; anything else (noqueue,
/// pfifo_fast, mq) means no impairment.
pub fn parse_qdisc_show(output: &str) -> Vec<Impairment> {
    let mut found = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let is_root_netem = tokens.get(1) == Some(&"netem") && tokens.contains(&"root");
        if !is_root_netem {
            continue;
        }

        let mut iter = tokens.iter().peekable();
        while let Some(token) = iter.next() {
            match *token {
                "delay" => {
                    if let Some(Some(imp)) = iter
                        .next()
                        .map(|v| Impairment::parse(FaultKind::Delay, v).ok().flatten())
                    {
                        found.push(imp);
                    }
                }
                "loss" => {
                    if iter.peek() == Some(&&"random") {
                        iter.next();
                    }
                    if let Some(Some(imp)) = iter
                        .next()
                        .map(|v| Impairment::parse(FaultKind::Loss, v).ok().flatten())
                    {
                        found.push(imp);
                    }
                }
                _ => {}
            }
        }
    }

    found
}

/// Whether `tc qdisc del` stderr means there was nothing to delete.
pub fn is_absent_qdisc_error(stderr: &str) -> bool {
    stderr.contains("No such file or directory")
        || stderr.contains("Cannot delete qdisc with handle of zero")
        || stderr.contains("Cannot find specified qdisc")
}

/// Render impairments the way reports and read-back errors show them.
pub fn describe(impairments: &[Impairment]) -> String {
    if impairments.is_empty() {
        "none".to_string()
    } else {
        impairments
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
