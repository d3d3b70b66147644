//! Result aggregation and report output
//!
//! `aggregate` is pure: it turns the completion-ordered result stream into
//! the deterministic, deduplicated report consumed by the writers, without
//! touching the network or the filesystem.

use crate::proxy::models::{Outcome, ProbeResult, ProxyType};
use crate::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Per-outcome totals over a whole run, for the diagnostic channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub working: usize,
    pub unreachable: usize,
    pub timeout: usize,
    pub mismatch: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn tally(results: &[ProbeResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.outcome {
                Outcome::Working => counts.working += 1,
                Outcome::Unreachable => counts.unreachable += 1,
                Outcome::Timeout => counts.timeout += 1,
                Outcome::ProtocolMismatch => counts.mismatch += 1,
                Outcome::Error(_) => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.working + self.unreachable + self.timeout + self.mismatch + self.error
    }
}

/// One report entry in the form downstream proxy configs expect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub server: String,
    pub protocol: String,
}

/// Final ordered list of confirmed-working proxies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Working results, one per (candidate, protocol), in input order
    pub entries: Vec<ProbeResult>,
    /// Totals over every probe of the run, not just the working ones
    pub counts: OutcomeCounts,
}

impl Report {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Working entries as config objects (`{server, protocol}`)
    pub fn config_entries(&self) -> Vec<ConfigEntry> {
        self.entries
            .iter()
            .map(|entry| ConfigEntry {
                server: entry.candidate.to_addr_string(),
                protocol: entry.protocol.to_string(),
            })
            .collect()
    }

    /// Working-entry count per protocol, in probe order
    pub fn protocol_counts(&self) -> Vec<(ProxyType, usize)> {
        ProxyType::ALL
            .iter()
            .map(|&protocol| {
                let count = self
                    .entries
                    .iter()
                    .filter(|entry| entry.protocol == protocol)
                    .count();
                (protocol, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// The fastest working entry, if any
    pub fn fastest(&self) -> Option<&ProbeResult> {
        self.entries.iter().min_by_key(|entry| entry.latency_ms)
    }

    /// Render the human-readable report text with the config snippet.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let total = self.counts.total();
        let rate = if total > 0 {
            self.counts.working as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let _ = writeln!(out, "=== PROXY CHECK RESULTS ===");
        let _ = writeln!(out, "Date: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Working: {} of {} probes", self.counts.working, total);
        let _ = writeln!(out, "Success rate: {:.1}%", rate);
        let _ = writeln!(out);

        if !self.entries.is_empty() {
            let _ = writeln!(out, "By protocol:");
            for (protocol, count) in self.protocol_counts() {
                let _ = writeln!(out, "  {}: {}", protocol.to_string().to_uppercase(), count);
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "=== WORKING PROXIES ===");
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{} | {} | {}ms",
                entry.candidate.to_addr_string(),
                entry.protocol,
                entry.latency_ms
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "=== CONFIG SNIPPET ===");
        let snippet = serde_json::to_string_pretty(&self.config_entries())
            .unwrap_or_else(|_| "[]".to_string());
        let _ = writeln!(out, "{}", snippet);

        out
    }

    /// Write the text report to a file
    pub fn save_text<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.render_text())?;
        Ok(())
    }

    /// Write the config entries as JSON to a file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config_entries())?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Build the final report from completion-ordered probe results.
///
/// Keeps only working results, drops repeats of the same
/// (candidate, protocol) pair, and sorts by the candidate's input position
/// and then protocol order, so identical inputs and outcomes always produce
/// identical reports regardless of network timing.
pub fn aggregate(results: Vec<ProbeResult>) -> Report {
    let counts = OutcomeCounts::tally(&results);

    let mut seen: HashSet<(String, u16, ProxyType)> = HashSet::new();
    let mut entries: Vec<ProbeResult> = results
        .into_iter()
        .filter(|result| result.is_working())
        .filter(|result| {
            seen.insert((
                result.candidate.host.clone(),
                result.candidate.port,
                result.protocol,
            ))
        })
        .collect();

    entries.sort_by_key(|entry| (entry.candidate.index, entry.protocol));

    Report { entries, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::Candidate;

    fn result(
        host: &str,
        port: u16,
        index: usize,
        protocol: ProxyType,
        outcome: Outcome,
        latency_ms: u64,
    ) -> ProbeResult {
        ProbeResult::new(
            Candidate::new(host.to_string(), port, index),
            protocol,
            outcome,
            latency_ms,
        )
    }

    #[test]
    fn test_aggregate_keeps_only_working() {
        let results = vec![
            result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 100),
            result("2.2.2.2", 80, 1, ProxyType::Http, Outcome::Timeout, 2000),
            result(
                "3.3.3.3",
                80,
                2,
                ProxyType::Http,
                Outcome::Error("reset".to_string()),
                40,
            ),
        ];
        let report = aggregate(results);
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].candidate.host, "1.1.1.1");
        assert_eq!(report.counts.working, 1);
        assert_eq!(report.counts.timeout, 1);
        assert_eq!(report.counts.error, 1);
        assert_eq!(report.counts.total(), 3);
    }

    #[test]
    fn test_aggregate_restores_input_order() {
        // Completion order scrambled; report order must follow input index
        let results = vec![
            result("86.110.189.154", 4145, 1, ProxyType::Socks4, Outcome::Working, 80),
            result("79.137.202.115", 63128, 0, ProxyType::Https, Outcome::Working, 350),
        ];
        let report = aggregate(results);
        let servers: Vec<(String, String)> = report
            .config_entries()
            .into_iter()
            .map(|e| (e.server, e.protocol))
            .collect();
        assert_eq!(
            servers,
            vec![
                ("79.137.202.115:63128".to_string(), "https".to_string()),
                ("86.110.189.154:4145".to_string(), "socks4".to_string()),
            ]
        );
    }

    #[test]
    fn test_aggregate_orders_protocols_within_candidate() {
        let results = vec![
            result("1.1.1.1", 80, 0, ProxyType::Socks5, Outcome::Working, 60),
            result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 90),
        ];
        let report = aggregate(results);
        assert_eq!(report.entries[0].protocol, ProxyType::Http);
        assert_eq!(report.entries[1].protocol, ProxyType::Socks5);
    }

    #[test]
    fn test_aggregate_drops_duplicate_pairs_keeps_multi_protocol() {
        let results = vec![
            result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 100),
            result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 110),
            result("1.1.1.1", 80, 0, ProxyType::Https, Outcome::Working, 120),
        ];
        let report = aggregate(results);
        // Same pair collapses; a second protocol is its own entry
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_aggregate_is_stable_across_completion_orders() {
        let a = result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 100);
        let b = result("2.2.2.2", 80, 1, ProxyType::Socks5, Outcome::Working, 50);
        let c = result("3.3.3.3", 80, 2, ProxyType::Http, Outcome::Unreachable, 10);

        let first = aggregate(vec![a.clone(), b.clone(), c.clone()]);
        let second = aggregate(vec![b, c, a]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_fastest_and_protocol_counts() {
        let results = vec![
            result("1.1.1.1", 80, 0, ProxyType::Http, Outcome::Working, 300),
            result("2.2.2.2", 1080, 1, ProxyType::Socks5, Outcome::Working, 45),
        ];
        let report = aggregate(results);
        assert_eq!(report.fastest().unwrap().candidate.host, "2.2.2.2");
        assert_eq!(
            report.protocol_counts(),
            vec![(ProxyType::Http, 1), (ProxyType::Socks5, 1)]
        );
    }

    #[test]
    fn test_render_text_contains_entries_and_snippet() {
        let results = vec![result(
            "1.1.1.1",
            80,
            0,
            ProxyType::Http,
            Outcome::Working,
            100,
        )];
        let report = aggregate(results);
        let text = report.render_text();
        assert!(text.contains("=== WORKING PROXIES ==="));
        assert!(text.contains("1.1.1.1:80 | http | 100ms"));
        assert!(text.contains("\"server\": \"1.1.1.1:80\""));
        assert!(text.contains("\"protocol\": \"http\""));
    }

    #[test]
    fn test_empty_report_renders() {
        let report = aggregate(Vec::new());
        assert!(report.is_empty());
        let text = report.render_text();
        assert!(text.contains("Success rate: 0.0%"));
    }
}
