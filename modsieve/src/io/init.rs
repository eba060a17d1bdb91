//! Initialization helpers for `.modsieve/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{SieveConfig, write_config};

const MODULE_MAP_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/module_map/v1.schema.json"
));

const EMPTY_MANIFEST: &str = "{\n  \"version\": 1,\n  \"modules\": {}\n}\n";

/// All canonical paths within `.modsieve/` for a project root.
#[derive(Debug, Clone)]
pub struct SievePaths {
    pub root: PathBuf,
    pub sieve_dir: PathBuf,
    pub config_path: PathBuf,
    pub manifest_path: PathBuf,
    pub self_manifest_path: PathBuf,
    pub schema_path: PathBuf,
    pub cache_dir: PathBuf,
}

impl SievePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let sieve_dir = root.join(".modsieve");
        Self {
            root: root.clone(),
            sieve_dir: sieve_dir.clone(),
            config_path: sieve_dir.join("config.toml"),
            manifest_path: sieve_dir.join("modules.json"),
            self_manifest_path: sieve_dir.join("modules.self.json"),
            schema_path: sieve_dir.join("module_map.schema.json"),
            cache_dir: sieve_dir.join("cache"),
        }
    }

    /// Manifest for the given inspection mode.
    pub fn manifest_for(&self, self_inspect: bool) -> &Path {
        if self_inspect {
            &self.self_manifest_path
        } else {
            &self.manifest_path
        }
    }
}

/// Options for `init_sieve`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing tool-owned files.
    pub force: bool,
}

/// Create `.modsieve/` scaffolding in `root`.
///
/// Fails if `.modsieve/` already exists unless `options.force` is set.
pub fn init_sieve(root: &Path, options: &InitOptions) -> Result<SievePaths> {
    let paths = SievePaths::new(root);
    if paths.sieve_dir.exists() && !options.force {
        return Err(anyhow!(
            "modsieve init: .modsieve already exists (use --force to overwrite)"
        ));
    }
    if paths.sieve_dir.exists() && !paths.sieve_dir.is_dir() {
        return Err(anyhow!("modsieve init: .modsieve exists but is not a directory"));
    }

    create_dir(&paths.sieve_dir)?;
    create_dir(&paths.cache_dir)?;

    write_config(&paths.config_path, &SieveConfig::default())?;
    write_if_missing_or_force(&paths.schema_path, MODULE_MAP_SCHEMA, options.force)?;
    write_if_missing_or_force(&paths.manifest_path, EMPTY_MANIFEST, options.force)?;
    write_if_missing_or_force(&paths.self_manifest_path, EMPTY_MANIFEST, options.force)?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
