//! Proxy validation core
//!
//! This module provides functionality for:
//! - Parsing candidate lists in HOST:PORT format with per-line warnings
//! - Probing candidates over HTTP, HTTPS, SOCKS4 and SOCKS5 with hard
//!   per-probe deadlines
//! - Scheduling many probes concurrently under a bounded pool
//! - Aggregating results into a deterministic report of working proxies

pub mod checker;
pub mod models;
pub mod parser;
pub mod probe;
pub mod report;
pub mod target;

pub use checker::{CheckerConfig, ProxyChecker};
pub use models::{Candidate, Outcome, ParseWarning, ProbeResult, ProxyType};
pub use parser::CandidateParser;
pub use probe::probe;
pub use report::{aggregate, ConfigEntry, OutcomeCounts, Report};
pub use target::TestTarget;
