//! Module identifier rules.
//!
//! The wire protocol is line-framed, so ids that could embed newlines or
//! marker text must never reach a batch. Ids are checked once, at manifest
//! load, not at decode time.

use std::sync::LazyLock;

use regex::Regex;

static MODULE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:\-]*$").unwrap());

/// True if `id` is a well-formed module identifier.
pub fn is_valid_module_id(id: &str) -> bool {
    MODULE_ID_RE.is_match(id)
}

/// Check every id in a candidate set, returning one message per violation.
pub fn validate_module_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut errors = Vec::new();
    for id in ids {
        if !is_valid_module_id(id) {
            errors.push(format!(
                "invalid module id {:?}: must match {}",
                id,
                MODULE_ID_RE.as_str()
            ));
        }
    }
    errors
}
