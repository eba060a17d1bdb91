//! Public facade: cached loadable/forbidden accessors for one scope.
//!
//! A [`ModuleExplorer`] owns a single analysis scope and memoizes one
//! [`AnalysisReport`] per instance, so the loadable and forbidden maps a
//! caller sees always come from the same run. The persistent cache is
//! consulted all-or-nothing for the same reason: serving one projection from
//! a fresh entry and the other from a stale one would break the partition
//! guarantee.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::AnalysisReport;
use crate::engine;
use crate::io::cache::{RESULT_TTL, ResultCache};
use crate::io::config::load_config;
use crate::io::init::SievePaths;
use crate::io::module_map::{ManifestProvider, ModuleMapProvider};
use crate::io::prober::{ProbeExecutor, ProcessProber};

/// One analysis target: a project root plus the self-inspect mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub root: PathBuf,
    pub self_inspect: bool,
}

impl Scope {
    pub fn new(root: impl Into<PathBuf>, self_inspect: bool) -> Self {
        Self {
            root: root.into(),
            self_inspect,
        }
    }

    /// Cache key for one projection of this scope's result.
    fn cache_key(&self, projection: &str) -> String {
        format!(
            "modsieve.{projection}.{}.{}",
            self.root.display(),
            self.self_inspect
        )
    }
}

/// Lazily analyzes one scope and serves both result projections.
pub struct ModuleExplorer<P, E> {
    scope: Scope,
    provider: P,
    prober: E,
    cache: ResultCache,
    use_cache: bool,
    report: Option<AnalysisReport>,
}

impl<P: ModuleMapProvider, E: ProbeExecutor> ModuleExplorer<P, E> {
    pub fn new(scope: Scope, provider: P, prober: E, cache: ResultCache) -> Self {
        Self {
            scope,
            provider,
            prober,
            cache,
            use_cache: true,
            report: None,
        }
    }

    /// Disable or re-enable the persistent cache. When disabled, every fresh
    /// explorer recomputes via the engine and writes nothing back.
    pub fn set_use_cache(&mut self, use_cache: bool) {
        self.use_cache = use_cache;
    }

    /// Modules that load cleanly, id → source locator.
    pub fn loadable_modules(&mut self) -> Result<BTreeMap<String, PathBuf>> {
        Ok(self.analysis()?.loadable.clone())
    }

    /// Modules that failed to load, id → captured error text.
    pub fn forbidden_modules(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(self.analysis()?.forbidden.clone())
    }

    /// The full report backing both projections, computing it on first access.
    pub fn analysis(&mut self) -> Result<&AnalysisReport> {
        if self.report.is_none() {
            self.report = Some(self.compute_or_cached()?);
        }
        self.report
            .as_ref()
            .ok_or_else(|| anyhow!("analysis result missing after compute"))
    }

    #[instrument(skip_all, fields(root = %self.scope.root.display(), self_inspect = self.scope.self_inspect))]
    fn compute_or_cached(&self) -> Result<AnalysisReport> {
        if self.use_cache
            && let Some(report) = self.cached_report()
        {
            debug!("serving analysis from cache");
            return Ok(report);
        }

        let candidates = self.provider.candidates()?;
        let report = engine::analyze(&self.prober, &candidates)?;

        if self.use_cache {
            self.store(&report);
        }
        Ok(report)
    }

    /// Both projections must be live for a hit; otherwise recompute.
    fn cached_report(&self) -> Option<AnalysisReport> {
        let loadable: BTreeMap<String, PathBuf> =
            self.cache.get(&self.scope.cache_key("loadable"))?;
        let forbidden: BTreeMap<String, String> =
            self.cache.get(&self.scope.cache_key("forbidden"))?;
        Some(AnalysisReport {
            loadable,
            forbidden,
            passes: 0,
            sub_runs: 0,
        })
    }

    /// Cache write failures degrade to uncached operation.
    fn store(&self, report: &AnalysisReport) {
        let writes = [
            self.cache.set(
                &self.scope.cache_key("loadable"),
                &report.loadable,
                RESULT_TTL,
            ),
            self.cache.set(
                &self.scope.cache_key("forbidden"),
                &report.forbidden,
                RESULT_TTL,
            ),
        ];
        for result in writes {
            if let Err(err) = result {
                warn!(err = %err, "failed to persist analysis result");
            }
        }
    }
}

/// Convenience constructor used by the CLI.
pub fn explorer_for_root(
    root: &Path,
    self_inspect: bool,
    use_cache: bool,
) -> Result<ModuleExplorer<ManifestProvider, ProcessProber>> {
    let paths = SievePaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let provider = ManifestProvider::new(&paths, self_inspect);
    let prober = ProcessProber::from_config(&cfg, root, self_inspect);
    let cache = ResultCache::new(paths.cache_dir.clone());
    let mut explorer = ModuleExplorer::new(Scope::new(root, self_inspect), provider, prober, cache);
    explorer.set_use_cache(use_cache);
    Ok(explorer)
}
