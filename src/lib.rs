//! Proxy Vet - Concurrent Proxy List Validator
//!
//! Parses untrusted `host:port` lists, probes each candidate over HTTP,
//! HTTPS, SOCKS4 and SOCKS5 with bounded concurrency and hard per-probe
//! deadlines, and reports the proxies that demonstrably relay traffic.

pub mod proxy;
pub mod tui;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
