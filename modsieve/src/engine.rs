//! Iterative crash-isolation over candidate modules.
//!
//! One [`analyze`] call drives the prober through as many runs as it takes to
//! reach a fixed point: a full pass over the surviving candidates with zero
//! crashes. Two nested loops:
//!
//! - **Inner loop**: submit the remaining modules as one batch. A crash is
//!   localized to the module whose record was truncated; that module is
//!   excluded and the shrunken batch resubmitted until the batch drains.
//! - **Outer loop**: module interactions are order- and presence-dependent
//!   (two modules racing to define one symbol crash whichever loads second),
//!   so after any pass that crashed, the reduced candidate set is re-validated
//!   from scratch.
//!
//! Each crashing pass permanently excludes at least one module, so the number
//! of passes is bounded by the candidate count plus one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::{ProtocolError, decode};
use crate::core::types::{AnalysisReport, BatchStatus, ProbeOutcome};
use crate::io::prober::ProbeExecutor;

/// Partition `candidates` into loadable and forbidden modules.
///
/// Process crashes are recovered internally and only ever show up as entries
/// in the forbidden map. Errors are reserved for conditions that invalidate
/// the whole analysis: a structurally malformed stream ([`ProtocolError`],
/// downcastable from the returned error), a prober that hangs past its
/// timeout, or a prober that cannot be spawned at all. No partial results
/// survive an error.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn analyze<E: ProbeExecutor>(
    prober: &E,
    candidates: &BTreeMap<String, PathBuf>,
) -> Result<AnalysisReport> {
    if candidates.is_empty() {
        return Ok(AnalysisReport::empty());
    }

    let mut forbidden: BTreeMap<String, String> = BTreeMap::new();
    let mut passes = 0u32;
    let mut sub_runs = 0u32;

    let resolved = loop {
        passes += 1;
        let mut remaining: BTreeMap<String, PathBuf> = candidates
            .iter()
            .filter(|(id, _)| !forbidden.contains_key(*id))
            .map(|(id, locator)| (id.clone(), locator.clone()))
            .collect();
        let mut resolved: BTreeMap<String, ProbeOutcome> = BTreeMap::new();
        let mut crashed_this_pass = false;

        while !remaining.is_empty() {
            let batch: Vec<(String, PathBuf)> = remaining
                .iter()
                .map(|(id, locator)| (id.clone(), locator.clone()))
                .collect();
            debug!(pass = passes, batch_len = batch.len(), "submitting batch");
            let stream = prober.run(&batch)?;
            sub_runs += 1;

            let result = decode(&stream)?;
            for (id, outcome) in result.entries {
                if remaining.remove(&id).is_none() {
                    return Err(ProtocolError::ForeignRecord(id).into());
                }
                if let ProbeOutcome::Forbidden { error_text } = &outcome {
                    debug!(module = %id, "module rejected by prober");
                    forbidden.insert(id.clone(), error_text.clone());
                }
                resolved.insert(id, outcome);
            }

            match result.status {
                BatchStatus::CompletedAll => {
                    if !remaining.is_empty() {
                        return Err(ProtocolError::MissingRecords(remaining.len()).into());
                    }
                }
                BatchStatus::Crashed {
                    last_attempted,
                    partial_text,
                } => {
                    if remaining.remove(&last_attempted).is_none() {
                        return Err(ProtocolError::ForeignRecord(last_attempted).into());
                    }
                    warn!(module = %last_attempted, "prober died mid-batch; excluding module");
                    forbidden.insert(last_attempted, partial_text);
                    crashed_this_pass = true;
                }
            }
        }

        if !crashed_this_pass {
            break resolved;
        }
        // Exclusions change which modules coexist in the process, which can
        // change which module crashes next. Re-validate the reduced set.
        debug!(
            pass = passes,
            excluded = forbidden.len(),
            "pass crashed; re-validating reduced candidate set"
        );
    };

    let loadable: BTreeMap<String, PathBuf> = resolved
        .iter()
        .filter(|(_, outcome)| matches!(outcome, ProbeOutcome::Loadable))
        .filter_map(|(id, _)| candidates.get(id).map(|loc| (id.clone(), loc.clone())))
        .collect();

    info!(
        loadable = loadable.len(),
        forbidden = forbidden.len(),
        passes,
        sub_runs,
        "analysis reached fixed point"
    );
    Ok(AnalysisReport {
        loadable,
        forbidden,
        passes,
        sub_runs,
    })
}
