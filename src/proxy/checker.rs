//! Probe scheduler for validating many candidates concurrently

use crate::proxy::models::{Candidate, ProbeResult, ProxyType};
use crate::proxy::probe::probe;
use crate::proxy::target::TestTarget;
use crate::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// Default deadline for each probe in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 10;

/// Default URL candidates must relay traffic to
const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Buffered results between the scheduler and a streaming consumer
const STREAM_BUFFER: usize = 100;

/// Configuration for the probe scheduler
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Deadline for each individual probe
    pub timeout: Duration,
    /// Number of concurrent probes
    pub concurrency: usize,
    /// URL candidates must relay traffic to
    pub test_url: String,
    /// Protocols probed for every candidate, in order
    pub protocols: Vec<ProxyType>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            protocols: ProxyType::ALL.to_vec(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_protocols(mut self, protocols: Vec<ProxyType>) -> Self {
        self.protocols = protocols;
        self
    }
}

/// Scheduler that fans (candidate, protocol) pairs out across a bounded
/// pool of concurrent probes.
///
/// Every submitted pair yields exactly one [`ProbeResult`]; a slow or hung
/// candidate occupies only its own slot until its deadline fires.
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    target: TestTarget,
}

impl ProxyChecker {
    /// Create a scheduler from a configuration.
    ///
    /// Fails only if the test URL does not parse; that is the one
    /// configuration error that aborts a run before any probing starts.
    pub fn with_config(config: CheckerConfig) -> Result<Self> {
        let target = TestTarget::parse(&config.test_url)?;
        Ok(Self { config, target })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Number of probes a run over `candidates` will perform
    pub fn total_probes(&self, candidates: &[Candidate]) -> usize {
        candidates.len() * self.config.protocols.len()
    }

    /// Expand candidates into (candidate, protocol) work units,
    /// candidate-major so report order matches input order per protocol.
    fn pairs(&self, candidates: &[Candidate]) -> Vec<(Candidate, ProxyType)> {
        candidates
            .iter()
            .flat_map(|candidate| {
                self.config
                    .protocols
                    .iter()
                    .map(move |protocol| (candidate.clone(), *protocol))
            })
            .collect()
    }

    /// Probe all candidates with all configured protocols.
    ///
    /// Results arrive in completion order; `aggregate` restores the
    /// deterministic external ordering.
    pub async fn run_checks(&self, candidates: Vec<Candidate>) -> Vec<ProbeResult> {
        let limit = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        stream::iter(self.pairs(&candidates))
            .map(|(candidate, protocol)| {
                let sem = Arc::clone(&semaphore);
                let target = self.target.clone();
                let timeout = self.config.timeout;
                async move {
                    // Semaphore acquire only fails if the semaphore is
                    // closed, which cannot happen while we hold the Arc.
                    let _permit = sem
                        .acquire()
                        .await
                        .expect("Semaphore closed unexpectedly");
                    probe(&candidate, protocol, &target, timeout).await
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await
    }

    /// Probe all candidates, delivering results over a channel as they
    /// complete. The channel closes when every pair has been resolved.
    pub fn check_stream(&self, candidates: Vec<Candidate>) -> mpsc::Receiver<ProbeResult> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let checker = self.clone();

        tokio::spawn(async move {
            let limit = checker.config.concurrency.max(1);
            let semaphore = Arc::new(Semaphore::new(limit));

            let mut results = stream::iter(checker.pairs(&candidates))
                .map(|(candidate, protocol)| {
                    let sem = Arc::clone(&semaphore);
                    let target = checker.target.clone();
                    let timeout = checker.config.timeout;
                    async move {
                        let _permit = sem
                            .acquire()
                            .await
                            .expect("Semaphore closed unexpectedly");
                        probe(&candidate, protocol, &target, timeout).await
                    }
                })
                .buffer_unordered(limit);

            while let Some(result) = results.next().await {
                // Receiver gone means the consumer quit early; stop probing.
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}
