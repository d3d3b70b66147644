//! Candidate parser for turning raw proxy lists into validated candidates

use crate::proxy::models::{Candidate, ParseWarning};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Host token: an IP literal or hostname, no whitespace, no empty string.
static HOST_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+$").expect("Invalid host regex"));

/// Candidate parser for reading proxy lists from strings and files
pub struct CandidateParser;

impl CandidateParser {
    /// Parse a single HOST:PORT line.
    ///
    /// The line is split on the last `:` so IPv6-style hosts with embedded
    /// colons keep their full host part. Blank lines and `#` comments yield
    /// `Ok(None)`; anything else malformed yields `Err` with the reason.
    pub fn parse_line(line: &str) -> std::result::Result<Option<(String, u16)>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (host, port_str) = match line.rsplit_once(':') {
            Some(parts) => parts,
            None => return Err("missing ':' separator".to_string()),
        };

        if host.is_empty() {
            return Err("empty host".to_string());
        }
        if !HOST_REGEX.is_match(host) {
            return Err("host contains whitespace".to_string());
        }

        let port: u16 = match port_str.parse() {
            Ok(p) => p,
            Err(_) => return Err(format!("invalid port {:?}", port_str)),
        };
        if port == 0 {
            return Err("port out of range (1-65535)".to_string());
        }

        Ok(Some((host.to_string(), port)))
    }

    /// Parse candidates from an iterator of lines.
    ///
    /// Malformed lines become warnings, never failures. Duplicate host:port
    /// entries are dropped (first occurrence wins) and indices are assigned
    /// after deduplication, in input order.
    pub fn parse_lines<'a, I>(lines: I) -> (Vec<Candidate>, Vec<ParseWarning>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut candidates = Vec::new();
        let mut warnings = Vec::new();
        let mut seen: HashSet<(String, u16)> = HashSet::new();

        for (line_no, line) in lines.into_iter().enumerate() {
            match Self::parse_line(line) {
                Ok(Some((host, port))) => {
                    if seen.insert((host.clone(), port)) {
                        let index = candidates.len();
                        candidates.push(Candidate::new(host, port, index));
                    }
                }
                Ok(None) => {}
                Err(reason) => {
                    warnings.push(ParseWarning {
                        line: line_no + 1,
                        content: line.trim().to_string(),
                        reason,
                    });
                }
            }
        }

        (candidates, warnings)
    }

    /// Parse candidates from a string (multiple lines)
    pub fn parse_string(content: &str) -> (Vec<Candidate>, Vec<ParseWarning>) {
        Self::parse_lines(content.lines())
    }

    /// Parse candidates from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<(Vec<Candidate>, Vec<ParseWarning>)> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content))
    }

    /// Save candidates to a file, one HOST:PORT per line
    pub fn save_to_file<P: AsRef<Path>>(candidates: &[Candidate], path: P) -> Result<()> {
        let content: String = candidates
            .iter()
            .map(Candidate::to_addr_string)
            .collect::<Vec<_>>()
            .join("\n");

        fs::write(path, content)?;
        Ok(())
    }
}
