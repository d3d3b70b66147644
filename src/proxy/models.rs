//! Data models for candidates and probe results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Proxy protocol enumeration
///
/// The declaration order is the order candidates are probed in and the
/// order report entries are sorted by for a single candidate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// All supported protocols, in probe order.
    pub const ALL: [ProxyType; 4] = [
        ProxyType::Http,
        ProxyType::Https,
        ProxyType::Socks4,
        ProxyType::Socks5,
    ];
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

/// A parsed `host:port` entry awaiting validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
    /// Position in the deduplicated input. Report ordering sorts on this so
    /// output stays stable regardless of probe completion order.
    pub index: usize,
}

impl Candidate {
    pub fn new(host: String, port: u16, index: usize) -> Self {
        Self { host, port, index }
    }

    /// Get the candidate in HOST:PORT format
    pub fn to_addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Classified result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The proxy relayed traffic for the probed protocol
    Working,
    /// TCP connect failed, DNS failed, or the proxy rejected the handshake
    Unreachable,
    /// The probe deadline expired before the exchange completed
    Timeout,
    /// The endpoint answered, but not with the probed protocol's contract
    ProtocolMismatch,
    /// Unexpected I/O fault mid-exchange (reset, malformed stream, ...)
    Error(String),
}

impl Outcome {
    pub fn is_working(&self) -> bool {
        matches!(self, Outcome::Working)
    }

    /// Short lowercase label for display and logging
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Working => "working",
            Outcome::Unreachable => "unreachable",
            Outcome::Timeout => "timeout",
            Outcome::ProtocolMismatch => "mismatch",
            Outcome::Error(_) => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Error(detail) => write!(f, "error: {}", detail),
            other => write!(f, "{}", other.label()),
        }
    }
}

impl From<io::Error> for Outcome {
    fn from(err: io::Error) -> Self {
        Outcome::Error(err.to_string())
    }
}

/// Result of probing one candidate with one protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub protocol: ProxyType,
    pub outcome: Outcome,
    /// Time from probe start to classification, for every outcome
    pub latency_ms: u64,
}

impl ProbeResult {
    pub fn new(
        candidate: Candidate,
        protocol: ProxyType,
        outcome: Outcome,
        latency_ms: u64,
    ) -> Self {
        Self {
            candidate,
            protocol,
            outcome,
            latency_ms,
        }
    }

    pub fn is_working(&self) -> bool {
        self.outcome.is_working()
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({}ms)",
            self.candidate, self.protocol, self.outcome, self.latency_ms
        )
    }
}

/// Warning emitted for a malformed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the input
    pub line: usize,
    pub content: String,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line, self.reason, self.content)
    }
}
