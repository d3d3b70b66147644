//! Validation target, parsed from the test URL candidates must relay to

use crate::Result;
use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `http(s)://host[:port][/path]`
static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?)://([^/:\s]+)(?::(\d{1,5}))?(/\S*)?$").expect("Invalid URL regex")
});

/// Port used for HTTPS CONNECT tunnels
const TLS_PORT: u16 = 443;

/// The external endpoint probes ask candidates to relay traffic to.
///
/// Probes never talk to this endpoint directly; it is only named inside
/// proxy requests (absolute URI for HTTP, authority for CONNECT and SOCKS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestTarget {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl TestTarget {
    /// Parse a test URL. Only `http` and `https` schemes are accepted.
    pub fn parse(url: &str) -> Result<Self> {
        let caps = URL_REGEX
            .captures(url.trim())
            .ok_or_else(|| anyhow!("invalid test URL: {}", url))?;

        let scheme = caps[1].to_string();
        let host = caps[2].to_string();
        let default_port = if scheme == "https" { TLS_PORT } else { 80 };
        let port = match caps.get(3) {
            Some(m) => {
                let p: u32 = m.as_str().parse()?;
                if p == 0 || p > u16::MAX as u32 {
                    return Err(anyhow!("test URL port out of range: {}", p));
                }
                p as u16
            }
            None => default_port,
        };
        let path = caps
            .get(4)
            .map_or_else(|| "/".to_string(), |m| m.as_str().to_string());

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port SOCKS tunnels dial on the target host
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `Host:` header value; omits default ports
    pub fn host_header(&self) -> String {
        let default_port = if self.scheme == "https" { TLS_PORT } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Absolute URI for GET requests routed through an HTTP proxy
    pub fn absolute_uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host_header(), self.path)
    }

    /// Authority for HTTP CONNECT tunnels, always on the TLS port
    pub fn connect_authority(&self) -> String {
        format!("{}:{}", self.host, TLS_PORT)
    }
}
