//! dynip - dynamic IP update client and daemon.

use clap::{Parser, Subcommand};
use dynip::config::{all_fields, Config, Key};
use dynip::error::DynipError;
use dynip::logging;
use dynip::protocol::{redacted_url, UpdateClient, UpdateResult};
use dynip::scheduler::{self, Scheduler};
use dynip::service::{self, ServiceOptions, DEFAULT_UNIT_DIR};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Parser)]
#[command(name = "dynip")]
#[command(about = "Dynamic IP update client and daemon")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'f', long, global = true)]
    config: Option<PathBuf>,

    /// Override a config value (key=value), may be repeated
    #[arg(short = 's', long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the DNS record once (default)
    Update {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run as daemon, updating every interval
    Daemon,

    /// Validate configuration and show the request that would be sent
    Validate,

    /// Install as a systemd service
    Install {
        /// User account to run the service as
        #[arg(long)]
        user: Option<String>,

        /// Directory for the unit file
        #[arg(long, default_value = DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,
    },

    /// Remove the systemd service
    Uninstall {
        /// Directory holding the unit file
        #[arg(long, default_value = DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,
    },
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppExit {
    Success = 0,
    UpdateFailed = -1,
    ServiceFailed = -5,
    ConfigFailed = -10,
    LoggingFailed = -20,
}

impl AppExit {
    fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<DynipError>() {
            Some(DynipError::Config(_)) => AppExit::ConfigFailed,
            Some(DynipError::Logging(_)) => AppExit::LoggingFailed,
            Some(DynipError::Service(_)) => AppExit::ServiceFailed,
            _ => AppExit::UpdateFailed,
        }
    }
}

/// Outcome of a single-shot update, printed with `--json`.
#[derive(Debug, Serialize)]
struct UpdateReport {
    hostname: String,
    result: UpdateResult,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Resolve the config file; the flag marks a path the user named explicitly.
fn get_config_path(cli_path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = cli_path {
        return (path, true);
    }

    let user_file = dirs::config_dir().map(|p| p.join("dynip/dynip.toml"));
    if let Some(path) = &user_file {
        if path.exists() {
            return (path.clone(), false);
        }
    }

    // Only use /etc if the file exists there
    let etc = PathBuf::from("/etc/dynip.toml");
    if etc.exists() {
        return (etc, false);
    }

    (user_file.unwrap_or_else(|| PathBuf::from("dynip.toml")), false)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (config_path, explicit) = get_config_path(cli.config);
    let overrides = cli.overrides;

    let result = match cli.command.unwrap_or(Commands::Update { json: false }) {
        Commands::Update { json } => cmd_update(&config_path, explicit, &overrides, json).await,
        Commands::Daemon => cmd_daemon(&config_path, explicit, &overrides).await,
        Commands::Validate => cmd_validate(&config_path, explicit, &overrides),
        Commands::Install { user, unit_dir } => cmd_install(config_path, user, unit_dir),
        Commands::Uninstall { unit_dir } => cmd_uninstall(unit_dir),
    };

    let code = match result {
        Ok(()) => AppExit::Success,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("dynip: {:#}", e);
            AppExit::from_error(&e)
        }
    };
    std::process::exit(code as i32);
}

fn load_config(path: &Path, explicit: bool, overrides: &[String]) -> anyhow::Result<Arc<Config>> {
    let config = Config::load_from(path, explicit, overrides)?;
    logging::init(&config)?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }
    tracing::debug!("Config {}: {}", path.display(), config.dump());
    Ok(Arc::new(config))
}

async fn cmd_update(
    path: &Path,
    explicit: bool,
    overrides: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(path, explicit, overrides)?;
    let client = UpdateClient::new(Arc::clone(&config))?;

    let outcome = scheduler::attempt(Arc::new(client)).await;

    let report = UpdateReport {
        hostname: config.hostname.clone(),
        result: match &outcome {
            Ok(result) => *result,
            Err(e) => e.update_result(),
        },
        success: outcome.is_ok(),
        error: outcome.as_ref().err().map(|e| e.to_string()),
        timestamp: chrono::Utc::now(),
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.success {
        println!("{}: {}", report.hostname, report.result);
    }

    outcome?;
    Ok(())
}

async fn cmd_daemon(path: &Path, explicit: bool, overrides: &[String]) -> anyhow::Result<()> {
    let config = load_config(path, explicit, overrides)?;
    let client = UpdateClient::new(Arc::clone(&config))?;

    let (tx, rx) = oneshot::channel();
    scheduler::spawn_signal_listener(tx);

    Scheduler::new(Arc::new(client), config.hostname.clone(), config.interval)
        .run(rx)
        .await?;
    Ok(())
}

fn cmd_validate(path: &Path, explicit: bool, overrides: &[String]) -> anyhow::Result<()> {
    let config = Config::load_from(path, explicit, overrides)?;
    for warning in config.warnings() {
        eprintln!("warning: {}", warning);
    }

    println!("Config file: {}", path.display());
    for field in all_fields() {
        let value = config.value(field.key);
        let shown = if field.key == Key::Token { "****".into() } else { value };
        println!("  {:<12} {}", field.name, shown);
    }
    println!("\nRequest: {}", redacted_url(&config));
    Ok(())
}

fn cmd_install(config: PathBuf, user: Option<String>, unit_dir: PathBuf) -> anyhow::Result<()> {
    let executable = std::env::current_exe()
        .map_err(|e| DynipError::Service(format!("cannot locate executable: {}", e)))?;
    let config = std::fs::canonicalize(&config).unwrap_or(config);

    let path = service::install(&ServiceOptions {
        executable,
        config,
        user,
        unit_dir,
    })?;

    println!("Installed {}", path.display());
    println!("Enable with: systemctl enable --now {}", service::SERVICE_NAME);
    Ok(())
}

fn cmd_uninstall(unit_dir: PathBuf) -> anyhow::Result<()> {
    let path = service::uninstall(&unit_dir)?;
    println!("Removed {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_update() {
        let cli = Cli::parse_from(["dynip", "-f", "/tmp/dynip.toml"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/dynip.toml")));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["dynip", "daemon", "-s", "myip=10.0.0.1", "--set", "debug=yes"]);
        assert!(matches!(cli.command, Some(Commands::Daemon)));
        assert_eq!(
            cli.overrides,
            vec!["myip=10.0.0.1".to_string(), "debug=yes".to_string()]
        );
    }

    #[test]
    fn test_bad_override_exits_with_config_code() {
        // clap accepts any text; validation happens on load
        let cli = Cli::parse_from(["dynip", "-s", "hostname", "-s", "nope=1"]);
        assert_eq!(cli.overrides.len(), 2);

        let err = Config::load_from(Path::new("/nonexistent/dynip.toml"), false, &cli.overrides)
            .unwrap_err();
        let exit = AppExit::from_error(&anyhow::Error::from(err));
        assert_eq!(exit, AppExit::ConfigFailed);
        assert_eq!(exit as i32, -10);
    }

    #[test]
    fn test_explicit_config_path() {
        let (path, explicit) = get_config_path(Some(PathBuf::from("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
        assert!(explicit);
        assert!(!get_config_path(None).1);
    }

    #[test]
    fn test_exit_codes() {
        let cases = [
            (DynipError::Config("x".into()), AppExit::ConfigFailed, -10),
            (DynipError::Logging("x".into()), AppExit::LoggingFailed, -20),
            (DynipError::Service("x".into()), AppExit::ServiceFailed, -5),
            (DynipError::Provider(UpdateResult::NoAuth), AppExit::UpdateFailed, -1),
            (DynipError::Network("x".into()), AppExit::UpdateFailed, -1),
        ];
        for (err, expected, code) in cases {
            let exit = AppExit::from_error(&anyhow::Error::from(err));
            assert_eq!(exit, expected);
            assert_eq!(exit as i32, code);
        }
        assert_eq!(AppExit::Success as i32, 0);
    }

    #[test]
    fn test_report_json() {
        let report = UpdateReport {
            hostname: "home.example.com".to_string(),
            result: UpdateResult::TooSoon,
            success: false,
            error: Some("Provider returned TOO_SOON".to_string()),
            timestamp: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["result"], "TOO_SOON");
        assert_eq!(value["success"], false);
        assert_eq!(value["hostname"], "home.example.com");
    }
}
