//! Configuration management for dynip.
//!
//! Every key dynip understands is declared once in a static registry of
//! [`ConfigField`]s. Values are resolved from layered sources (command line
//! overrides, then the config file, then the registry defaults) into a typed
//! [`Config`] that is built once at startup and never mutated.

use crate::error::{DynipError, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use InclusionRule::{Always, Never, NotEmpty, NotFalse};

/// Policy deciding whether a key appears in the update query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionRule {
    /// Always sent, even when empty.
    Always,
    /// Never sent.
    Never,
    /// Sent only when the value is non-empty.
    NotEmpty,
    /// Sent unless the value is `NO`, `OFF` or `FALSE`.
    NotFalse,
}

/// Identifies one configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ProtocolVer,
    Url,
    Username,
    Token,
    Hostname,
    Tld,
    MyIp,
    Mx,
    BackMx,
    Wildcard,
    Interval,
    Log,
    Syslog,
    Debug,
    Proto,
}

/// A named configuration item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigField {
    pub key: Key,
    pub name: &'static str,
    pub default: &'static str,
    pub required: bool,
    pub inclusion: InclusionRule,
}

const fn field(
    key: Key,
    name: &'static str,
    default: &'static str,
    required: bool,
    inclusion: InclusionRule,
) -> ConfigField {
    ConfigField {
        key,
        name,
        default,
        required,
        inclusion,
    }
}

/// Keys that take part in building the update request, in query order.
pub static REQUEST_FIELDS: &[ConfigField] = &[
    field(Key::ProtocolVer, "protocol_ver", "1.3", false, Never),
    field(Key::Url, "url", "api.cp.easydns.com/dyn/generic.php", false, Never),
    field(Key::Username, "username", "", true, Never),
    field(Key::Token, "token", "", true, Never),
    field(Key::Hostname, "hostname", "", true, Always),
    field(Key::Tld, "tld", "", false, NotEmpty),
    field(Key::MyIp, "myip", "1.1.1.1", false, Always),
    field(Key::Mx, "mx", "", false, NotEmpty),
    field(Key::BackMx, "backmx", "NO", false, NotFalse),
    field(Key::Wildcard, "wildcard", "OFF", false, NotFalse),
    field(Key::Interval, "interval", "11 minutes", false, Never),
];

/// Process options that never reach the provider.
pub static OPTION_FIELDS: &[ConfigField] = &[
    field(Key::Log, "log", "", false, Never),
    field(Key::Syslog, "syslog", "NO", false, Never),
    field(Key::Debug, "debug", "NO", false, Never),
    field(Key::Proto, "proto", "https", false, Never),
];

/// Every known key.
pub fn all_fields() -> impl Iterator<Item = &'static ConfigField> {
    REQUEST_FIELDS.iter().chain(OPTION_FIELDS.iter())
}

/// Look a field up by its key name.
pub fn lookup(name: &str) -> Option<&'static ConfigField> {
    all_fields().find(|f| f.name == name)
}

/// Default daemon tick interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(11 * 60);

/// Resolved, validated configuration.
#[derive(Clone)]
pub struct Config {
    pub protocol_ver: String,
    pub url: String,
    pub username: String,
    pub token: String,
    pub hostname: String,
    pub tld: String,
    pub myip: String,
    pub mx: String,
    pub backmx: String,
    pub wildcard: String,
    pub interval: Duration,
    interval_text: String,
    pub log_file: Option<PathBuf>,
    pub syslog: bool,
    pub debug: bool,
    pub proto: String,
    warnings: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dump())
    }
}

impl Config {
    /// Load configuration from a file plus command line overrides.
    ///
    /// A missing file is an empty layer unless `explicit` is set, in which
    /// case the caller named the file and it must exist. Overrides are raw `key=value` strings.
    pub fn load_from(path: &Path, explicit: bool, overrides: &[String]) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            parse_file(&content)?
        } else if explicit {
            return Err(DynipError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            HashMap::new()
        };

        let overrides = overrides
            .iter()
            .map(|s| parse_override(s))
            .collect::<Result<HashMap<_, _>>>()?;
        Self::resolve(&[&overrides, &file])
    }

    /// Build a configuration from a single map of values.
    pub fn from_map(map: HashMap<String, String>) -> Result<Self> {
        Self::resolve(&[&map])
    }

    /// Resolve every registry key against the layers, first layer wins.
    fn resolve(layers: &[&HashMap<String, String>]) -> Result<Self> {
        let mut warnings = Vec::new();
        for layer in layers {
            let mut unknown: Vec<_> = layer.keys().filter(|name| lookup(name).is_none()).collect();
            unknown.sort();
            for name in unknown {
                warnings.push(format!("Ignoring unknown config key {}", name));
            }
        }

        let mut values: HashMap<Key, String> = HashMap::new();
        for f in all_fields() {
            let raw = layers
                .iter()
                .find_map(|layer| layer.get(f.name))
                .map(String::as_str)
                .unwrap_or(f.default);
            let value = resolve_env(raw, &mut warnings);

            if f.required && value.is_empty() {
                return Err(DynipError::Config(format!("missing required key {}", f.name)));
            }
            values.insert(f.key, value);
        }

        let mut take = |key: Key| values.remove(&key).unwrap_or_default();

        let interval_text = take(Key::Interval);
        let interval = parse_duration(&interval_text).ok_or_else(|| {
            DynipError::Config(format!("invalid interval '{}'", interval_text))
        })?;
        let log = take(Key::Log);

        Ok(Self {
            protocol_ver: take(Key::ProtocolVer),
            url: take(Key::Url),
            username: take(Key::Username),
            token: take(Key::Token),
            hostname: take(Key::Hostname),
            tld: take(Key::Tld),
            myip: take(Key::MyIp),
            mx: take(Key::Mx),
            backmx: take(Key::BackMx),
            wildcard: take(Key::Wildcard),
            interval,
            interval_text,
            log_file: (!log.is_empty()).then(|| PathBuf::from(log)),
            syslog: is_true(&take(Key::Syslog)),
            debug: is_true(&take(Key::Debug)),
            proto: take(Key::Proto),
            warnings,
        })
    }

    /// Problems found while resolving that did not stop loading. Reported
    /// by the caller once logging is set up.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Textual value of a key as it would be sent or displayed.
    pub fn value(&self, key: Key) -> Cow<'_, str> {
        match key {
            Key::ProtocolVer => Cow::Borrowed(&self.protocol_ver),
            Key::Url => Cow::Borrowed(&self.url),
            Key::Username => Cow::Borrowed(&self.username),
            Key::Token => Cow::Borrowed(&self.token),
            Key::Hostname => Cow::Borrowed(&self.hostname),
            Key::Tld => Cow::Borrowed(&self.tld),
            Key::MyIp => Cow::Borrowed(&self.myip),
            Key::Mx => Cow::Borrowed(&self.mx),
            Key::BackMx => Cow::Borrowed(&self.backmx),
            Key::Wildcard => Cow::Borrowed(&self.wildcard),
            Key::Interval => Cow::Borrowed(&self.interval_text),
            Key::Log => self
                .log_file
                .as_deref()
                .map(|p| p.to_string_lossy())
                .unwrap_or(Cow::Borrowed("")),
            Key::Syslog => Cow::Borrowed(yes_no(self.syslog)),
            Key::Debug => Cow::Borrowed(yes_no(self.debug)),
            Key::Proto => Cow::Borrowed(&self.proto),
        }
    }

    /// All properties as `key=value` pairs, token redacted.
    pub fn dump(&self) -> String {
        all_fields()
            .map(|f| {
                let value = self.value(f.key);
                let shown = if f.key == Key::Token && !value.is_empty() {
                    Cow::Borrowed("****")
                } else if value.is_empty() {
                    Cow::Borrowed("\"\"")
                } else {
                    value
                };
                format!("{}={}", f.name, shown)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parse a flat TOML table into textual key/value pairs.
pub fn parse_file(content: &str) -> Result<HashMap<String, String>> {
    let table: toml::Table = content.parse()?;

    table
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    return Err(DynipError::Config(format!(
                        "key {} must be a plain value",
                        name
                    )));
                }
            };
            Ok((name, text))
        })
        .collect()
}

/// Parse a `key=value` command line override.
///
/// Unknown keys are accepted here and reported as warnings on resolution,
/// like unknown keys in the file.
pub fn parse_override(s: &str) -> Result<(String, String)> {
    let (name, value) = s.split_once('=').ok_or_else(|| {
        DynipError::Config(format!("expected key=value override, got '{}'", s))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(DynipError::Config(format!("override '{}' has no key", s)));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parse intervals such as `11 minutes`, `90s` or `1h`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: u64 = number.parse().ok()?;

    let secs = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 24 * 60 * 60,
        _ => return None,
    };
    number.checked_mul(secs).map(Duration::from_secs)
}

/// `NO`, `OFF` or `FALSE`, any case.
pub fn is_false(s: &str) -> bool {
    matches!(s.to_ascii_uppercase().as_str(), "NO" | "OFF" | "FALSE")
}

/// `YES`, `ON` or `TRUE`, any case.
pub fn is_true(s: &str) -> bool {
    matches!(s.to_ascii_uppercase().as_str(), "YES" | "ON" | "TRUE")
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "YES"
    } else {
        "NO"
    }
}

/// Resolve environment variable references (values starting with $).
fn resolve_env(value: &str, warnings: &mut Vec<String>) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| {
            warnings.push(format!("Environment variable {} not set", var_name));
            value.to_string()
        })
    } else {
        value.to_string()
    }
}
