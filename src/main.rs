use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use proxy_vet::{
    aggregate, tui::ProbeMonitorApp, CandidateParser, CheckerConfig, ProxyChecker, ProxyType,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// A concurrent proxy list validator
#[derive(Parser)]
#[command(name = "proxy-vet")]
#[command(about = "A concurrent proxy list validator for HTTP, HTTPS, SOCKS4 and SOCKS5")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and deduplicate a candidate list without probing
    Parse {
        /// Input file containing HOST:PORT lines
        input: PathBuf,
        /// Output file for the cleaned candidate list
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Probe candidates and report the working proxies
    Check {
        /// Input file containing HOST:PORT lines
        input: PathBuf,
        /// Output file for the text report
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output file for the JSON config snippet
        #[arg(long)]
        json: Option<PathBuf>,
        /// Protocol to probe (repeatable; defaults to all four)
        #[arg(short = 't', long = "protocol")]
        protocols: Vec<String>,
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value = "10")]
        concurrency: usize,
        /// Per-probe timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// URL candidates must relay traffic to
        #[arg(long, default_value = "http://httpbin.org/ip")]
        test_url: String,
    },
    /// Probe candidates with a live progress display
    Tui {
        /// Input file containing HOST:PORT lines
        input: PathBuf,
        /// Output file where working proxies are appended live
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Protocol to probe (repeatable; defaults to all four)
        #[arg(short = 't', long = "protocol")]
        protocols: Vec<String>,
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value = "10")]
        concurrency: usize,
        /// Per-probe timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// URL candidates must relay traffic to
        #[arg(long, default_value = "http://httpbin.org/ip")]
        test_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { input, output } => {
            let (candidates, warnings) = CandidateParser::parse_file(&input)?;
            for warning in &warnings {
                warn!("skipped {}", warning);
            }

            println!(
                "Parsed {} candidates from {:?} ({} malformed lines skipped)",
                candidates.len(),
                input,
                warnings.len()
            );

            if let Some(output_path) = output {
                CandidateParser::save_to_file(&candidates, &output_path)?;
                println!("Saved candidate list to {:?}", output_path);
            } else {
                for candidate in &candidates {
                    println!("{}", candidate);
                }
            }
        }
        Commands::Check {
            input,
            output,
            json,
            protocols,
            concurrency,
            timeout,
            test_url,
        } => {
            let protocols = parse_protocols(&protocols)?;
            let (candidates, warnings) = CandidateParser::parse_file(&input)?;
            for warning in &warnings {
                warn!("skipped {}", warning);
            }

            println!(
                "Loaded {} candidates from {:?} ({} malformed lines skipped)",
                candidates.len(),
                input,
                warnings.len()
            );
            println!(
                "Probing {} protocol(s) with {} concurrent probes, timeout: {}s",
                protocols.len(),
                concurrency,
                timeout
            );
            println!("Test URL: {}", test_url);
            println!();

            let config = CheckerConfig::new()
                .with_concurrency(concurrency)
                .with_timeout(Duration::from_secs(timeout))
                .with_test_url(test_url)
                .with_protocols(protocols);

            let checker = ProxyChecker::with_config(config)?;
            let results = checker.run_checks(candidates).await;
            let report = aggregate(results);

            println!(
                "Results: {} working of {} probes",
                report.counts.working,
                report.counts.total()
            );
            println!(
                "Failures: {} unreachable, {} timeout, {} mismatch, {} error",
                report.counts.unreachable,
                report.counts.timeout,
                report.counts.mismatch,
                report.counts.error
            );

            if !report.is_empty() {
                println!("\nWorking proxies:");
                for entry in &report.entries {
                    println!(
                        "  {} {} ({}ms)",
                        entry.candidate.to_addr_string(),
                        entry.protocol,
                        entry.latency_ms
                    );
                }

                println!("\nBy protocol:");
                for (protocol, count) in report.protocol_counts() {
                    println!("  {}: {}", protocol.to_string().to_uppercase(), count);
                }

                if let Some(fastest) = report.fastest() {
                    println!(
                        "\nFastest: {} {} ({}ms)",
                        fastest.candidate.to_addr_string(),
                        fastest.protocol,
                        fastest.latency_ms
                    );
                }
            }

            if let Some(output_path) = output {
                report.save_text(&output_path)?;
                println!("\nSaved report to {:?}", output_path);
            }
            if let Some(json_path) = json {
                report.save_json(&json_path)?;
                println!("Saved config snippet to {:?}", json_path);
            }
        }
        Commands::Tui {
            input,
            output,
            protocols,
            concurrency,
            timeout,
            test_url,
        } => {
            let protocols = parse_protocols(&protocols)?;
            let (candidates, warnings) = CandidateParser::parse_file(&input)?;
            for warning in &warnings {
                warn!("skipped {}", warning);
            }

            let config = CheckerConfig::new()
                .with_concurrency(concurrency)
                .with_timeout(Duration::from_secs(timeout))
                .with_test_url(test_url)
                .with_protocols(protocols);

            let mut app = ProbeMonitorApp::new(candidates, config, output);
            app.run().await?;
        }
    }

    Ok(())
}

/// Resolve protocol names from the command line; empty means all four.
fn parse_protocols(names: &[String]) -> Result<Vec<ProxyType>> {
    if names.is_empty() {
        return Ok(ProxyType::ALL.to_vec());
    }

    names
        .iter()
        .map(|name| match name.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(anyhow!(
                "Invalid protocol: {}. Use: http, https, socks4, socks5",
                name
            )),
        })
        .collect()
}
