//! Analysis configuration stored under `.modsieve/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Tool configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SieveConfig {
    /// Wall-clock budget for a single prober run in seconds. A prober that
    /// hangs past this is killed and the analysis fails.
    pub probe_timeout_secs: u64,

    /// Upper bound on the prober stream kept in memory per run.
    pub probe_output_limit_bytes: usize,

    pub prober: ProberConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProberConfig {
    /// Command to spawn per batch (e.g. `["php","vendor/bin/modsieve-probe"]`).
    pub command: Vec<String>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            command: vec!["modsieve-probe".to_string()],
        }
    }
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5 * 60,
            probe_output_limit_bytes: 1_000_000,
            prober: ProberConfig::default(),
        }
    }
}

impl SieveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        if self.probe_output_limit_bytes == 0 {
            return Err(anyhow!("probe_output_limit_bytes must be > 0"));
        }
        if self.prober.command.is_empty() || self.prober.command[0].trim().is_empty() {
            return Err(anyhow!("prober.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SieveConfig::default()`.
pub fn load_config(path: &Path) -> Result<SieveConfig> {
    if !path.exists() {
        let cfg = SieveConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SieveConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SieveConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
