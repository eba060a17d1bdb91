//! Module manifest load helpers with schema + id validation.
//!
//! The [`ModuleMapProvider`] trait is the seam between the explorer and
//! wherever candidates come from; the production provider reads a JSON
//! manifest validated against `schemas/module_map/v1.schema.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;

use crate::core::module_id::validate_module_ids;
use crate::io::init::SievePaths;

const MODULE_MAP_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/module_map/v1.schema.json"
));

/// Supplies the candidate set for one analysis scope.
///
/// Must be deterministic for a given scope within one analysis; the engine
/// assumes the returned map does not change under its feet.
pub trait ModuleMapProvider {
    fn candidates(&self) -> Result<BTreeMap<String, PathBuf>>;
}

/// Provider backed by the `.modsieve/modules.json` manifest (or the
/// self-inspect variant).
pub struct ManifestProvider {
    manifest_path: PathBuf,
}

impl ManifestProvider {
    pub fn new(paths: &SievePaths, self_inspect: bool) -> Self {
        Self {
            manifest_path: paths.manifest_for(self_inspect).to_path_buf(),
        }
    }
}

impl ModuleMapProvider for ManifestProvider {
    fn candidates(&self) -> Result<BTreeMap<String, PathBuf>> {
        load_module_map(&self.manifest_path)
    }
}

#[derive(Debug, Deserialize)]
struct ManifestV1 {
    #[allow(dead_code)]
    version: u32,
    modules: BTreeMap<String, PathBuf>,
}

/// Load and validate a module manifest (schema + id rules).
pub fn load_module_map(path: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate manifest {}", path.display()))?;
    let manifest: ManifestV1 = serde_json::from_value(value)
        .with_context(|| format!("deserialize manifest {}", path.display()))?;

    let errors = validate_module_ids(manifest.modules.keys().map(String::as_str));
    if !errors.is_empty() {
        return Err(anyhow!(
            "manifest {} has invalid module ids: {}",
            path.display(),
            errors.join("; ")
        ));
    }
    Ok(manifest.modules)
}

fn validate_schema(manifest: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(MODULE_MAP_SCHEMA).context("parse bundled module map schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(manifest) {
        let messages = compiled
            .iter_errors(manifest)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "manifest schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::init::{InitOptions, init_sieve};

    fn write_manifest(path: &Path, contents: &str) {
        fs::write(path, contents).expect("write manifest");
    }

    #[test]
    fn loads_valid_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("modules.json");
        write_manifest(
            &path,
            r#"{"version": 1, "modules": {"alpha": "src/alpha.mod", "beta": "src/beta.mod"}}"#,
        );

        let map = load_module_map(&path).expect("load");
        assert_eq!(map.len(), 2);
        assert_eq!(map["alpha"], PathBuf::from("src/alpha.mod"));
    }

    #[test]
    fn rejects_wrong_version() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("modules.json");
        write_manifest(&path, r#"{"version": 2, "modules": {}}"#);

        let err = load_module_map(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("modules.json");
        write_manifest(&path, r#"{"version": 1, "modules": {}, "extra": true}"#);

        assert!(load_module_map(&path).is_err());
    }

    #[test]
    fn rejects_invalid_module_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("modules.json");
        write_manifest(&path, r#"{"version": 1, "modules": {"bad id": "x.mod"}}"#);

        let err = load_module_map(&path).unwrap_err();
        assert!(err.to_string().contains("invalid module ids"));
    }

    #[test]
    fn provider_reads_mode_specific_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_sieve(temp.path(), &InitOptions { force: false }).expect("init");
        write_manifest(
            &paths.self_manifest_path,
            r#"{"version": 1, "modules": {"inner": "inner.mod"}}"#,
        );

        let provider = ManifestProvider::new(&paths, true);
        let map = provider.candidates().expect("candidates");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("inner"));

        let provider = ManifestProvider::new(&paths, false);
        let map = provider.candidates().expect("candidates");
        assert!(map.is_empty());
    }
}
