//! Shared deterministic types for loadability analysis.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of attempting to load one module while the prober kept running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The module loaded cleanly.
    Loadable,
    /// The prober caught a non-fatal error while loading the module.
    Forbidden {
        /// Error text reported by the prober for this module.
        error_text: String,
    },
}

/// Terminal status of one prober run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every module in the batch was processed and the batch terminator seen.
    CompletedAll,
    /// The prober process died while attempting `last_attempted`; modules after
    /// it in the batch were never reached.
    Crashed {
        /// Module whose record was truncated by the death of the prober.
        last_attempted: String,
        /// Whatever output preceded the crash for that module, possibly empty.
        partial_text: String,
    },
}

/// Decoded result of one prober run.
///
/// `entries` preserves the submission order of the outcomes actually observed
/// in this run; on a crash it covers only the records completed before the
/// truncation point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub entries: Vec<(String, ProbeOutcome)>,
    pub status: BatchStatus,
}

/// Final partition produced by one analysis, plus its convergence trace.
///
/// `loadable` and `forbidden` together cover the candidate set exactly, with
/// no overlap. `passes`/`sub_runs` count outer passes and prober invocations;
/// both are `0` when the report was served from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Modules that load cleanly, with their source locators.
    pub loadable: BTreeMap<String, PathBuf>,
    /// Modules that failed to load, with the captured error text.
    pub forbidden: BTreeMap<String, String>,
    /// Number of outer passes the analysis needed to reach a fixed point.
    pub passes: u32,
    /// Total prober invocations across all passes.
    pub sub_runs: u32,
}

impl AnalysisReport {
    /// An empty report for an empty candidate set.
    pub fn empty() -> Self {
        Self {
            loadable: BTreeMap::new(),
            forbidden: BTreeMap::new(),
            passes: 1,
            sub_runs: 0,
        }
    }
}
