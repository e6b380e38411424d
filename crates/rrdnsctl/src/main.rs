// # rrdnsctl - Round-Robin DNS Reconciler
//
// This binary is a THIN integration layer over rrdns-core:
// - No reconciliation, probing or set logic lives here
// - It parses flags, builds the backend and prober, runs the plan and prints
//   the report
//
// ## Commands
//
// - `apply`: reconcile a single record given on the command line
// - `plan`: reconcile every record of a CSV or JSON plan file
//
// ## Configuration
//
// Every global flag can also be set through the environment:
//
// - `RRDNS_BACKEND`: Zone backend (cloudflare, file)
// - `RRDNS_ENDPOINT`: API base URL (cloudflare) or zone file path (file)
// - `RRDNS_API_TOKEN`: Cloudflare API token
// - `RRDNS_LOG_LEVEL`: trace, debug, info, warn, error
// - `RRDNS_DRY_RUN`, `RRDNS_STOP_ON_ERROR`: run switches
// - `RRDNS_OUTPUT`: table, json, csv
// - `RRDNS_PROBE_TIMEOUT_MS`, `RRDNS_PROBE_CONCURRENCY`: probe tuning
//
// ## Example
//
// ```bash
// export RRDNS_API_TOKEN=your_token
//
// rrdnsctl apply --zone contoso.com --name web --ipv4 10.0.1.10,10.0.1.11 \
//     --replace-existing true
// rrdnsctl --dry-run --output json plan --file records.csv --ttl 120
// ```
//
// Reports go to stdout; logs go to stderr.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rrdns_core::plan::{load_plan, parse_bool, split_addresses};
use rrdns_core::record::{ProbeType, RecordIntent, MAX_TTL};
use rrdns_core::{
    BackendConfig, BackendRegistry, OutputFormat, PlanFormat, PlanOverrides, ReconcileEvent,
    ReconcileOptions, Reconciler,
};
use rrdns_probe::NetworkProber;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different run results
///
/// - 0: Every record reconciled
/// - 1: Configuration or validation error (nothing was changed)
/// - 2: Runtime error (unexpected)
/// - 3: Completed, but some records or addresses failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RrdnsExitCode {
    /// Full success (probe rejections alone are warnings)
    Success = 0,
    /// Configuration, plan or zone validation error
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// One or more records or addresses failed
    PartialFailure = 3,
}

impl From<RrdnsExitCode> for ExitCode {
    fn from(code: RrdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Declarative, health-gated DNS round-robin reconciler
#[derive(Debug, Parser)]
#[command(name = "rrdnsctl", version, about)]
struct Cli {
    /// Zone backend
    #[arg(long, env = "RRDNS_BACKEND", default_value = "cloudflare", global = true)]
    backend: String,

    /// Backend endpoint: API base URL (cloudflare) or zone file path (file)
    #[arg(long, env = "RRDNS_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Cloudflare API token
    #[arg(long, env = "RRDNS_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RRDNS_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Compute and report changes without applying them
    #[arg(long, env = "RRDNS_DRY_RUN", global = true)]
    dry_run: bool,

    /// Halt the plan after the first failing record
    #[arg(long, env = "RRDNS_STOP_ON_ERROR", global = true)]
    stop_on_error: bool,

    /// Report format (table, json, csv)
    #[arg(long, env = "RRDNS_OUTPUT", default_value = "table", global = true)]
    output: String,

    /// Timeout of a single health probe in milliseconds
    #[arg(long, env = "RRDNS_PROBE_TIMEOUT_MS", default_value_t = 1500, global = true)]
    probe_timeout_ms: u64,

    /// Probes in flight per record family
    #[arg(long, env = "RRDNS_PROBE_CONCURRENCY", default_value_t = 16, global = true)]
    probe_concurrency: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile one record
    Apply {
        /// DNS zone
        #[arg(long)]
        zone: String,

        /// Host label within the zone (`@` for the apex)
        #[arg(long)]
        name: String,

        /// Candidate IPv4 addresses (comma or semicolon separated)
        #[arg(long)]
        ipv4: Option<String>,

        /// Candidate IPv6 addresses (comma or semicolon separated)
        #[arg(long)]
        ipv6: Option<String>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Reconcile every record of a plan file
    Plan {
        /// Plan file (.csv or .json)
        #[arg(long)]
        file: String,

        /// Plan format; inferred from the extension when omitted
        #[arg(long)]
        format: Option<String>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

/// Values that win over per-record plan values
#[derive(Debug, Args)]
struct OverrideArgs {
    /// TTL in seconds
    #[arg(long)]
    ttl: Option<u32>,

    /// Remove published addresses that are not desired (true/false)
    #[arg(long)]
    replace_existing: Option<String>,

    /// Probe candidates before publishing them (true/false)
    #[arg(long)]
    health_probe: Option<String>,

    /// Probe type (tcp, http)
    #[arg(long)]
    probe_type: Option<String>,

    /// Probe port
    #[arg(long)]
    probe_port: Option<u16>,

    /// HTTP probe path
    #[arg(long)]
    probe_path: Option<String>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> Result<PlanOverrides> {
        Ok(PlanOverrides {
            ttl: self.ttl,
            replace_existing: flag_bool("--replace-existing", self.replace_existing.as_deref())?,
            health_probe: flag_bool("--health-probe", self.health_probe.as_deref())?,
            probe_type: self
                .probe_type
                .as_deref()
                .map(|s| s.parse::<ProbeType>())
                .transpose()?,
            probe_port: self.probe_port,
            probe_path: self.probe_path.clone(),
        })
    }
}

fn flag_bool(flag: &str, value: Option<&str>) -> Result<Option<bool>> {
    value
        .map(|v| {
            parse_bool(v).ok_or_else(|| {
                anyhow::Error::from(rrdns_core::Error::config(format!(
                    "{flag} expects true or false. Got: {v}"
                )))
            })
        })
        .transpose()
}

impl Cli {
    /// Validate flags that clap cannot check on its own
    fn validate(&self) -> Result<()> {
        log_level(&self.log_level)?;
        self.output.parse::<OutputFormat>()?;

        if !(1..=60_000).contains(&self.probe_timeout_ms) {
            anyhow::bail!(
                "--probe-timeout-ms must be between 1 and 60000. Got: {}",
                self.probe_timeout_ms
            );
        }

        if !(1..=256).contains(&self.probe_concurrency) {
            anyhow::bail!(
                "--probe-concurrency must be between 1 and 256. Got: {}",
                self.probe_concurrency
            );
        }

        let overrides = match &self.command {
            Command::Apply { overrides, .. } | Command::Plan { overrides, .. } => overrides,
        };
        overrides.to_overrides()?;
        if let Some(ttl) = overrides.ttl
            && !(1..=MAX_TTL).contains(&ttl)
        {
            anyhow::bail!("--ttl must be between 1 and {MAX_TTL}. Got: {ttl}");
        }

        self.backend_config()?.validate()?;
        Ok(())
    }

    fn backend_config(&self) -> Result<BackendConfig> {
        match self.backend.to_ascii_lowercase().as_str() {
            "cloudflare" => {
                let api_token = self.api_token.clone().unwrap_or_default();
                if api_token.is_empty() {
                    anyhow::bail!(
                        "RRDNS_API_TOKEN is required for the cloudflare backend. \
                        Set it via: export RRDNS_API_TOKEN=your_token"
                    );
                }
                Ok(BackendConfig::Cloudflare {
                    api_token,
                    endpoint: self.endpoint.clone(),
                })
            }
            "file" => {
                let path = self.endpoint.clone().unwrap_or_default();
                if path.is_empty() {
                    anyhow::bail!(
                        "--endpoint (RRDNS_ENDPOINT) must name the zone file for the file backend"
                    );
                }
                Ok(BackendConfig::File { path })
            }
            other => anyhow::bail!(
                "Backend '{}' is not supported. Supported backends: cloudflare, file",
                other
            ),
        }
    }

    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            probe_timeout_ms: self.probe_timeout_ms,
            probe_concurrency: self.probe_concurrency,
            ..ReconcileOptions::default()
        }
        .with_dry_run(self.dry_run)
        .with_stop_on_error(self.stop_on_error)
    }
}

fn log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Parse one address list of the `apply` command into a single family
fn address_list(flag: &str, value: Option<&str>, want_v4: bool) -> Result<BTreeSet<IpAddr>> {
    let mut set = BTreeSet::new();
    for token in value.map(split_addresses).unwrap_or_default() {
        let address: IpAddr = token.parse().map_err(|_| {
            rrdns_core::Error::invalid_input(format!("{flag}: '{token}' is not an IP address"))
        })?;
        if address.is_ipv4() != want_v4 {
            return Err(rrdns_core::Error::invalid_input(format!(
                "{flag}: '{token}' is not an {} address",
                if want_v4 { "IPv4" } else { "IPv6" }
            ))
            .into());
        }
        set.insert(address);
    }
    Ok(set)
}

/// Build the single record of the `apply` command
///
/// Overrides act as the record's own values here.
fn apply_intent(
    zone: &str,
    name: &str,
    ipv4: Option<&str>,
    ipv6: Option<&str>,
    overrides: &PlanOverrides,
) -> Result<RecordIntent> {
    let mut intent = RecordIntent::new(zone, name);
    intent.desired_v4 = address_list("--ipv4", ipv4, true)?;
    intent.desired_v6 = address_list("--ipv6", ipv6, false)?;

    if let Some(ttl) = overrides.ttl {
        intent.ttl = ttl;
    }
    if let Some(replace) = overrides.replace_existing {
        intent.replace_existing = replace;
    }
    if let Some(enabled) = overrides.health_probe {
        intent.probe.enabled = enabled;
    }
    if let Some(probe_type) = overrides.probe_type {
        intent.probe.probe_type = probe_type;
    }
    intent.probe.port = overrides.probe_port;
    if let Some(path) = &overrides.probe_path {
        intent.probe.path = path.clone();
    }

    intent.validate()?;
    Ok(intent)
}

fn exit_code_for(err: &anyhow::Error) -> RrdnsExitCode {
    match err.downcast_ref::<rrdns_core::Error>() {
        Some(e) if e.is_fatal() => RrdnsExitCode::ConfigError,
        _ => RrdnsExitCode::RuntimeError,
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                RrdnsExitCode::ConfigError
            } else {
                RrdnsExitCode::Success
            };
            let _ = e.print();
            return code.into();
        }
    };

    if let Err(e) = cli.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return RrdnsExitCode::ConfigError.into();
    }

    // Validated above
    let level = log_level(&cli.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RrdnsExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RrdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(run(cli));

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            let code = exit_code_for(&e);
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            code.into()
        }
    }
}

/// Build components, run the plan and print the report
async fn run(cli: Cli) -> Result<RrdnsExitCode> {
    let output: OutputFormat = cli.output.parse()?;
    let options = cli.options();

    let intents = match &cli.command {
        Command::Apply {
            zone,
            name,
            ipv4,
            ipv6,
            overrides,
        } => {
            let overrides = overrides.to_overrides()?;
            vec![apply_intent(
                zone,
                name,
                ipv4.as_deref(),
                ipv6.as_deref(),
                &overrides,
            )?]
        }
        Command::Plan {
            file,
            format,
            overrides,
        } => {
            let overrides = overrides.to_overrides()?;
            let format = format
                .as_deref()
                .map(|f| f.parse::<PlanFormat>())
                .transpose()?;
            load_plan(file, format, &overrides).await?
        }
    };

    let registry = BackendRegistry::with_builtin();

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare backend");
        rrdns_provider_cloudflare::register(&registry);
    }

    let backend = registry.create_backend(&cli.backend_config()?)?;
    let prober = NetworkProber::new()?;

    info!(
        "Starting rrdnsctl: {} record(s), backend {}{}",
        intents.len(),
        backend.backend_name(),
        if options.dry_run { " [DRY-RUN]" } else { "" }
    );

    let (reconciler, events) = Reconciler::new(backend, Box::new(prober), options)?;
    let consumer = tokio::spawn(log_events(events));

    let run = reconciler.run_plan(&intents).await;

    // Closing the sender ends the consumer
    drop(reconciler);
    if let Err(e) = consumer.await {
        warn!("Event consumer ended abnormally: {}", e);
    }

    let run = run?;
    let report = rrdns_core::summarize(&run);
    println!("{}", report.render(output)?);

    let code = if run.is_success() {
        RrdnsExitCode::Success
    } else {
        RrdnsExitCode::PartialFailure
    };
    info!("Finished with exit code {}", code as u8);
    Ok(code)
}

/// Drain reconciler events into the log
async fn log_events(mut events: mpsc::Receiver<ReconcileEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Event: {:?}", event);
    }
}
