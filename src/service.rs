//! OS service registration.
//!
//! On unix the daemon is registered as a systemd unit that runs
//! `dynip -f <config> daemon`. A stop request from systemd arrives as
//! SIGTERM and is handled by the scheduler's signal listener.

use crate::error::{DynipError, Result};
use std::path::{Path, PathBuf};

/// Service name, also the unit file stem.
pub const SERVICE_NAME: &str = "dynip";

/// Default systemd unit directory.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Options for installing the service.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Binary to run.
    pub executable: PathBuf,
    /// Config file passed with `-f`.
    pub config: PathBuf,
    /// Account to run as; root when absent.
    pub user: Option<String>,
    /// Directory the unit file is written to.
    pub unit_dir: PathBuf,
}

/// Path of the unit file inside `unit_dir`.
pub fn unit_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(format!("{}.service", SERVICE_NAME))
}

/// Render the systemd unit.
pub fn render_unit(opts: &ServiceOptions) -> String {
    let mut unit = format!(
        "[Unit]\n\
         Description=Dynamic IP update service\n\
         Wants=network-online.target\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart=\"{}\" -f \"{}\" daemon\n\
         Restart=on-failure\n",
        opts.executable.display(),
        opts.config.display()
    );
    if let Some(user) = &opts.user {
        unit.push_str(&format!("User={}\n", user));
    }
    unit.push_str("\n[Install]\nWantedBy=multi-user.target\n");
    unit
}

/// Write the unit file. Returns its path.
#[cfg(unix)]
pub fn install(opts: &ServiceOptions) -> Result<PathBuf> {
    let path = unit_path(&opts.unit_dir);
    if path.exists() {
        return Err(DynipError::Service(format!(
            "service already installed at {}",
            path.display()
        )));
    }

    std::fs::create_dir_all(&opts.unit_dir).map_err(|e| service_io("install", &path, e))?;
    std::fs::write(&path, render_unit(opts)).map_err(|e| service_io("install", &path, e))?;
    tracing::info!("Installed service unit {}", path.display());
    Ok(path)
}

/// Remove the unit file. Returns its path.
#[cfg(unix)]
pub fn uninstall(unit_dir: &Path) -> Result<PathBuf> {
    let path = unit_path(unit_dir);
    std::fs::remove_file(&path).map_err(|e| service_io("uninstall", &path, e))?;
    tracing::info!("Removed service unit {}", path.display());
    Ok(path)
}

#[cfg(not(unix))]
pub fn install(_opts: &ServiceOptions) -> Result<PathBuf> {
    Err(DynipError::Service(
        "service install is not supported on this platform".to_string(),
    ))
}

#[cfg(not(unix))]
pub fn uninstall(_unit_dir: &Path) -> Result<PathBuf> {
    Err(DynipError::Service(
        "service uninstall is not supported on this platform".to_string(),
    ))
}

#[cfg(unix)]
fn service_io(action: &str, path: &Path, e: std::io::Error) -> DynipError {
    DynipError::Service(format!("service {} ({}): {}", action, path.display(), e))
}
