// # ptaccel - PT-Accelerator command line
//
// Thin front end over ptaccel-core. Every invocation performs one operation
// and exits; periodic runs come from an external scheduler (cron, systemd
// timers) calling `ptaccel run-task --scheduled`.
//
// The binary is responsible for:
// 1. Reading settings from flags and environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the plugin crates into the core engine
// 4. Running the requested command and mapping its outcome to an exit code
//
// ## Configuration
//
// Every setting can be given as a flag or an environment variable:
//
// - `PTACCEL_CONFIG_PATH`: Configuration document (default `config/config.json`)
// - `PTACCEL_HOSTS_PATH`: Hosts file to manage (default: the platform hosts file)
// - `PTACCEL_CFST_SCRIPT`: CloudflareSpeedTest wrapper script
//   (default `CloudflareST_linux_amd64/cfst_hosts.sh`)
// - `PTACCEL_LOG_LEVEL`: trace, debug, info, warn or error (default `info`)
//
// Next to the configuration document live the hosts source cache
// (`hosts_cache/`), the last selected IP (`best_ip`) and the lock file that
// keeps heavy tasks of concurrent invocations apart (`config.lock`).
//
// ## Example
//
// ```bash
// export PTACCEL_CONFIG_PATH=/app/config/config.json
// export PTACCEL_HOSTS_PATH=/etc/hosts
//
// ptaccel add-tracker tracker.example.org
// ptaccel client add qb1 --type qbittorrent --host 192.168.1.10 --port 8080
// ptaccel import
// ptaccel notify channel bark --type bark --field BARK_PUSH=https://api.day.app/key
// ptaccel cloudflare --cron "0 */6 * * *"
// ptaccel run-task --scheduled
// ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;
mod lock;

use commands::App;

/// Exit codes for different termination scenarios
///
/// - 0: Command succeeded
/// - 1: Configuration or startup error
/// - 2: Command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PtaccelExitCode {
    /// Command succeeded
    Success = 0,
    /// Settings invalid or configuration document unreadable
    ConfigError = 1,
    /// Command failed at runtime
    RuntimeError = 2,
}

impl From<PtaccelExitCode> for ExitCode {
    fn from(code: PtaccelExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "ptaccel")]
#[command(about = "Keep PT tracker domains pinned to a fast Cloudflare IP")]
#[command(version)]
struct Cli {
    /// Configuration document
    #[arg(long, env = "PTACCEL_CONFIG_PATH", default_value = "config/config.json", global = true)]
    config: PathBuf,

    /// Hosts file to manage
    #[arg(long, env = "PTACCEL_HOSTS_PATH", global = true)]
    hosts: Option<PathBuf>,

    /// CloudflareSpeedTest wrapper script
    #[arg(
        long,
        env = "PTACCEL_CFST_SCRIPT",
        default_value = ptaccel_cloudflare::DEFAULT_SCRIPT_PATH,
        global = true
    )]
    cfst_script: PathBuf,

    /// Log level
    #[arg(long, env = "PTACCEL_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Select the best Cloudflare IP, move every tracker to it and rewrite hosts
    RunTask {
        /// Skip the run when the scheduled speed test is disabled
        #[arg(long)]
        scheduled: bool,
    },

    /// Rewrite the managed hosts block from the configuration
    UpdateHosts,

    /// Remove every managed hosts block, then rewrite it
    ClearAndUpdateHosts,

    /// Import Cloudflare-fronted trackers from the configured download clients
    Import,

    /// Add a tracker domain
    AddTracker {
        /// Tracker domain, optionally with scheme, port or path
        domain: String,

        /// Display name (defaults to the domain)
        #[arg(long)]
        name: Option<String>,

        /// Also add the domain to the Cloudflare whitelist
        #[arg(long)]
        force_cloudflare: bool,
    },

    /// Remove a tracker domain
    DeleteTracker {
        /// Tracker domain
        domain: String,
    },

    /// Add many tracker domains at once
    BatchAdd {
        /// Domains (newline-separated arguments are split as well)
        domains: Vec<String>,

        /// Read additional domains from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Pin every tracker to an IP
    SetIp {
        /// IPv4 or IPv6 address
        ip: String,
    },

    /// Remove every tracker
    ClearTrackers,

    /// List trackers
    ListTrackers,

    /// Add a remote hosts source
    AddSource {
        /// Source URL (https:// is assumed without a scheme)
        url: String,

        /// Display name (defaults to the URL)
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove a remote hosts source
    DeleteSource {
        /// Source URL
        url: String,
    },

    /// Manage the Cloudflare whitelist
    Whitelist {
        #[command(subcommand)]
        command: WhitelistCommand,
    },

    /// Print the current hosts file
    ShowHosts,

    /// Manage download clients
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },

    /// Show or change the scheduled speed-test settings
    Cloudflare {
        /// Turn the scheduled run on or off
        #[arg(long)]
        enable: Option<bool>,

        /// Five-field cron expression for the external scheduler
        #[arg(long)]
        cron: Option<String>,
    },

    /// Manage notification settings and channels
    Notify {
        #[command(subcommand)]
        command: NotifyCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum ClientCommand {
    /// Add a download client
    Add {
        /// Unique client id
        id: String,

        /// Client type (qbittorrent or transmission)
        #[arg(long = "type")]
        kind: String,

        /// Hostname or IP address
        #[arg(long)]
        host: String,

        /// Web UI / RPC port
        #[arg(long)]
        port: u16,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// Connect over https
        #[arg(long)]
        https: bool,

        /// RPC path (Transmission)
        #[arg(long)]
        path: Option<String>,

        /// Save the client disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a download client
    Delete { id: String },
    /// Enable a download client
    Enable { id: String },
    /// Disable a download client
    Disable { id: String },
    /// List configured clients and supported types
    List,
    /// Connect to a saved client and count its tracker hosts
    Test { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum NotifyCommand {
    /// Print the notify settings
    Show,
    /// Change the global notify switches
    Set {
        /// Global switch
        #[arg(long)]
        enable: Option<bool>,

        /// Global hitokoto default
        #[arg(long)]
        hitokoto: Option<bool>,

        /// Title the test send skips (repeatable; replaces the list)
        #[arg(long = "skip-title")]
        skip_titles: Vec<String>,

        /// Empty the skip-title list
        #[arg(long, conflicts_with = "skip_titles")]
        clear_skip_titles: bool,
    },
    /// Replace the notify section with a JSON file
    Save {
        /// JSON object in the `notify` layout
        file: PathBuf,
    },
    /// Create or update a channel
    Channel {
        /// Channel name
        name: String,

        /// Channel type (bark, telegram, webhook, ...)
        #[arg(long = "type")]
        family: Option<String>,

        /// KEY=VALUE channel field (repeatable; an empty value removes it)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Enable or disable the channel
        #[arg(long)]
        enable: Option<bool>,

        /// Per-channel hitokoto override
        #[arg(long)]
        hitokoto: Option<bool>,
    },
    /// Remove a channel
    RemoveChannel { name: String },
    /// Send a test notification through the saved channels
    Test {
        /// Message title
        #[arg(long)]
        title: Option<String>,

        /// Message content
        #[arg(long)]
        content: Option<String>,
    },
}

/// Parse a `KEY=VALUE` channel field
fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum WhitelistCommand {
    /// Always treat a domain as Cloudflare-fronted
    Add { domain: String },
    /// Remove a domain from the whitelist
    Remove { domain: String },
    /// List whitelisted domains
    List,
}

/// Runtime settings
#[derive(Debug, Clone)]
struct Config {
    config_path: PathBuf,
    hosts_path: PathBuf,
    cfst_script: PathBuf,
    log_level: String,
}

impl Config {
    /// Resolve settings from parsed flags, filling platform defaults
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config_path: cli.config.clone(),
            hosts_path: cli
                .hosts
                .clone()
                .unwrap_or_else(|| PathBuf::from(ptaccel_hosts::default_hosts_path())),
            cfst_script: cli.cfst_script.clone(),
            log_level: cli.log_level.to_lowercase(),
        }
    }

    /// Validate settings before the runtime starts
    fn validate(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!(
                "PTACCEL_CONFIG_PATH cannot be empty. \
                Set it via: export PTACCEL_CONFIG_PATH=config/config.json"
            );
        }

        if self.config_path.is_dir() {
            anyhow::bail!(
                "PTACCEL_CONFIG_PATH points to a directory: {}. \
                Point it at a file, e.g. {}",
                self.config_path.display(),
                self.config_path.join("config.json").display()
            );
        }

        if self.hosts_path.as_os_str().is_empty() {
            anyhow::bail!("PTACCEL_HOSTS_PATH cannot be empty");
        }

        if self.hosts_path.is_dir() {
            anyhow::bail!(
                "PTACCEL_HOSTS_PATH points to a directory: {}",
                self.hosts_path.display()
            );
        }

        if self.cfst_script.as_os_str().is_empty() {
            anyhow::bail!("PTACCEL_CFST_SCRIPT cannot be empty");
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PTACCEL_LOG_LEVEL '{}' is invalid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn level(&self) -> Level {
        match self.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Directory holding cached copies of hosts sources
    fn hosts_cache_dir(&self) -> PathBuf {
        self.config_dir().join("hosts_cache")
    }

    /// Lock file serializing heavy tasks across processes
    fn task_lock_path(&self) -> PathBuf {
        self.config_path.with_extension("lock")
    }

    /// File remembering the last IP the speed test selected
    fn best_ip_path(&self) -> PathBuf {
        self.config_dir().join("best_ip")
    }
}

/// Exit code for a failed command
///
/// An unreadable configuration document is a configuration problem; every
/// other failure is a runtime one.
fn exit_code_for(err: &anyhow::Error) -> PtaccelExitCode {
    match err.downcast_ref::<ptaccel_core::Error>() {
        Some(ptaccel_core::Error::ConfigUnreadable(_)) | Some(ptaccel_core::Error::Config(_)) => {
            PtaccelExitCode::ConfigError
        }
        _ => PtaccelExitCode::RuntimeError,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_cli(&cli);
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        return PtaccelExitCode::ConfigError.into();
    }

    // Logs go to stderr so that --json output stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PtaccelExitCode::ConfigError.into();
    }

    info!("Using configuration {}", config.config_path.display());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PtaccelExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let app = match App::build(&config, cli.json).await {
            Ok(app) => app,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return PtaccelExitCode::ConfigError;
            }
        };

        match app.execute(cli.command).await {
            Ok(()) => PtaccelExitCode::Success,
            Err(e) => {
                error!("Command failed: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}
