// # prom-mdnsd - mDNS Service Discovery Daemon for Prometheus
//
// This daemon is a THIN integration layer over prom-mdns-core:
// - DO NOT add discovery, dedup or output logic here
// - All scheduling and aggregation MUST stay in prom-mdns-core
// - The mDNS wire protocol stays in prom-mdns-browser
//
// The prom-mdnsd daemon is responsible for:
// 1. Reading configuration from flags and environment variables
// 2. Initializing logging and the runtime
// 3. Wiring browser, engine, sink and output together
// 4. Translating signals into cancellation
//
// ## Configuration
//
// Every flag can also be set through the environment:
//
// - `--interval` / `PROM_MDNS_INTERVAL`: Refresh interval (default `10s`)
// - `--out` / `PROM_MDNS_OUT`: Output file, `-` for stdout (default `-`)
// - `--format` / `PROM_MDNS_FORMAT`: `json` or `yaml` (default `json`)
// - `--service` / `PROM_MDNS_SERVICES`: Service type to browse; repeatable,
//   comma-separated in the environment
// - `--query-timeout` / `PROM_MDNS_QUERY_TIMEOUT`: mDNS query window (default `1s`)
// - `--log-level` / `PROM_MDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// prom-mdnsd --interval 30s --out /etc/prometheus/sd/mdns.json
// ```
//
// Logs go to stderr; stdout is reserved for console output.

mod duration;

use anyhow::Result;
use clap::Parser;
use prom_mdns_browser::MdnsBrowser;
use prom_mdns_core::config::{HTTP_SERVICE, HTTPS_SERVICE};
use prom_mdns_core::{
    CancellationToken, ConsoleOutput, DedupSink, DiscoveryConfig, DiscoveryEngine, FileOutput,
    OutputConfig, OutputFormat, OutputWriter,
};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for the pipeline to drain after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum MdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (output failure, browser failure)
    RuntimeError = 2,
}

impl From<MdnsExitCode> for ExitCode {
    fn from(code: MdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command line configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Refresh interval (Go-style duration, e.g. 10s, 1m30s)
    #[arg(long, env = "PROM_MDNS_INTERVAL", default_value = "10s", value_parser = duration::parse_duration)]
    interval: Duration,

    /// Output file; `-` writes to stdout
    #[arg(long, env = "PROM_MDNS_OUT", default_value = "-")]
    out: String,

    /// Output format (json, yaml)
    #[arg(long, env = "PROM_MDNS_FORMAT", default_value = "json")]
    format: OutputFormat,

    /// Service type to browse (repeatable)
    #[arg(
        long = "service",
        env = "PROM_MDNS_SERVICES",
        value_delimiter = ',',
        default_values = [HTTP_SERVICE, HTTPS_SERVICE]
    )]
    services: Vec<String>,

    /// Length of each mDNS query window
    #[arg(long, env = "PROM_MDNS_QUERY_TIMEOUT", default_value = "1s", value_parser = duration::parse_duration)]
    query_timeout: Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROM_MDNS_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

impl Cli {
    /// Build and validate the discovery configuration
    fn discovery_config(&self) -> Result<DiscoveryConfig> {
        // The engine schedules in whole milliseconds
        if self.interval.subsec_nanos() % 1_000_000 != 0 {
            anyhow::bail!(
                "--interval ({:?}) must be a whole number of milliseconds",
                self.interval
            );
        }

        if self.query_timeout >= self.interval {
            anyhow::bail!(
                "--query-timeout ({:?}) must be shorter than --interval ({:?})",
                self.query_timeout,
                self.interval
            );
        }

        let mut config = DiscoveryConfig::new()
            .with_interval(self.interval)
            .with_service_names(self.services.iter().map(|s| s.trim()));
        config.output = OutputConfig::from_arg(&self.out);
        config.format = self.format;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here
            let code = if e.use_stderr() {
                MdnsExitCode::ConfigError
            } else {
                MdnsExitCode::CleanShutdown
            };
            let _ = e.print();
            return code.into();
        }
    };

    let config = match cli.discovery_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return MdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MdnsExitCode::ConfigError.into();
    }

    info!("Starting prom-mdnsd");
    info!(
        "Configuration loaded: {} service(s), interval {:?}, output {:?}",
        config.service_names.len(),
        config.interval(),
        config.output
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, cli.query_timeout).await {
            error!("Daemon error: {:#}", e);
            MdnsExitCode::RuntimeError
        } else {
            MdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal or a fatal output error
async fn run_daemon(config: DiscoveryConfig, query_timeout: Duration) -> Result<()> {
    let shutdown = shutdown_signal()?;

    let browser = MdnsBrowser::new(query_timeout)?;
    let (engine, mut events) = DiscoveryEngine::new(Arc::new(browser.clone()), &config)?;

    let writer: Box<dyn OutputWriter> = match &config.output {
        OutputConfig::Console => Box::new(ConsoleOutput::new()),
        OutputConfig::File { path } => Box::new(FileOutput::new(path).await?),
    };
    info!("Writing {:?} output to {}", config.format, writer.destination());
    let sink = DedupSink::new(writer, config.format);

    let (aggregate_tx, aggregate_rx) = mpsc::channel(config.engine.aggregate_channel_capacity);
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    let signals = tokio::spawn(async move {
        let signal = shutdown.await;
        info!("Received shutdown signal: {}", signal);
        signal_cancel.cancel();
    });

    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    // A failed commit is fatal; stop discovery as well.
    let sink_cancel = cancel.clone();
    let sink_task = async move {
        let result = sink.run(aggregate_rx).await;
        if result.is_err() {
            sink_cancel.cancel();
        }
        result
    };

    let pipeline = async { tokio::join!(engine.run(cancel.clone(), aggregate_tx), sink_task) };
    let drain_deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
    };

    let outcome = tokio::select! {
        (engine_result, sink_result) = pipeline => Ok((engine_result, sink_result)),
        _ = drain_deadline => Err(anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT)),
    };

    signals.abort();
    if let Err(e) = browser.shutdown() {
        warn!("{}", e);
    }
    // The event channel closes once the engine is dropped.
    drop(engine);
    let _ = event_log.await;

    let (engine_result, sink_result) = outcome?;
    engine_result?;
    let stats = sink_result?;

    info!(
        "Shutting down daemon: {} commit(s), {} unchanged cycle(s)",
        stats.committed, stats.skipped
    );

    Ok(())
}

/// Install handlers for shutdown signals (SIGTERM, SIGINT)
///
/// Handlers are installed before discovery starts so an early signal is not
/// lost. The returned future resolves to the name of the signal received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Install a handler for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "CTRL-C"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["prom-mdnsd"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments parse")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        let config = cli.discovery_config().unwrap();

        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.output, OutputConfig::Console);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.service_names, vec![HTTP_SERVICE, HTTPS_SERVICE]);
        assert_eq!(cli.query_timeout, Duration::from_secs(1));
        assert_eq!(cli.log_level, Level::INFO);
    }

    #[test]
    fn test_explicit_flags() {
        let cli = parse(&[
            "--interval",
            "1m30s",
            "--out",
            "/tmp/sd/mdns.yml",
            "--format",
            "yaml",
            "--service",
            "_node._tcp",
            "--service",
            "_app._tcp",
            "--query-timeout",
            "500ms",
            "--log-level",
            "debug",
        ]);
        let config = cli.discovery_config().unwrap();

        assert_eq!(config.interval(), Duration::from_secs(90));
        assert_eq!(
            config.output,
            OutputConfig::File {
                path: "/tmp/sd/mdns.yml".to_string()
            }
        );
        assert_eq!(config.format, OutputFormat::Yaml);
        assert_eq!(config.service_names, vec!["_node._tcp", "_app._tcp"]);
        assert_eq!(cli.query_timeout, Duration::from_millis(500));
        assert_eq!(cli.log_level, Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for args in [
            &["--interval", "0s"][..],
            &["--interval", "ten"][..],
            &["--format", "xml"][..],
            &["--log-level", "loud"][..],
        ] {
            let mut argv = vec!["prom-mdnsd"];
            argv.extend_from_slice(args);
            assert!(Cli::try_parse_from(argv).is_err(), "{:?} should be rejected", args);
        }
    }

    #[test]
    fn test_query_timeout_must_fit_interval() {
        let cli = parse(&["--interval", "1s", "--query-timeout", "2s"]);
        assert!(cli.discovery_config().is_err());
    }

    #[test]
    fn test_sub_millisecond_interval_rejected() {
        for interval in ["500us", "1500us", "1.0005s"] {
            let cli = parse(&["--interval", interval, "--query-timeout", "1ns"]);
            let err = cli.discovery_config().unwrap_err();
            assert!(
                err.to_string().contains("whole number of milliseconds"),
                "{}: unexpected error {}",
                interval,
                err
            );
        }

        let cli = parse(&["--interval", "1.5s"]);
        assert_eq!(
            cli.discovery_config().unwrap().interval(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_blank_service_rejected() {
        let cli = parse(&["--service", " "]);
        assert!(cli.discovery_config().is_err());
    }
}
