//! Configuration loading.
//!
//! The PPM is configured from a properties-style file of `key=value` lines
//! (`#` starts a comment; unknown keys are ignored so one file can also
//! carry bus-client settings). Filters and redactors read the raw map
//! themselves; the typed helpers below are for `main`'s startup wiring.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

/// Raw key/value view of the configuration file.
pub type ConfigMap = HashMap<String, String>;

/// Parse a `key=value` properties file.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigMap> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read configuration file {}", path.display()))?;

    let mut map = ConfigMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // A line is exactly one key=value pair; zero or multiple '=' drops
        // the whole line.
        match line.split_once('=') {
            Some((key, value)) if !value.contains('=') => {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => warn!(line = index + 1, "ignoring malformed configuration line"),
        }
    }

    Ok(map)
}

/// Whether an `ON`/`OFF` switch is set to `ON`.
pub fn flag_on(conf: &ConfigMap, key: &str) -> bool {
    conf.get(key).map(|v| v == "ON").unwrap_or(false)
}

/// A key that must be present for startup to proceed.
pub fn require<'a>(conf: &'a ConfigMap, key: &str) -> Result<&'a str> {
    conf.get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing required configuration key: {key}"))
}

/// A required numeric key.
pub fn require_f64(conf: &ConfigMap, key: &str) -> Result<f64> {
    require(conf, key)?
        .parse()
        .map_err(|_| anyhow!("configuration key {key} is not a number"))
}
