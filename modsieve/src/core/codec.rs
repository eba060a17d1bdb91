//! Marker-framed wire protocol between the engine and the prober.
//!
//! The prober receives a JSON batch manifest on stdin and reports progress on
//! stdout as a line-framed stream: a startup marker, one record per attempted
//! module, and a batch terminator. The framing is an internal contract — the
//! only load-bearing semantic is that a prober death truncates the stream
//! mid-record, which [`decode`] surfaces as [`BatchStatus::Crashed`].
//!
//! Decoding is strictly sequential over an immutable forward-only cursor and
//! never looks past the next marker boundary, so truncation is detected
//! unambiguously as "marker not found before end of input".

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{BatchResult, BatchStatus, ProbeOutcome};

/// First line the prober must emit once its runtime is up.
pub const STARTUP_MARKER: &str = "@=modsieve:startup=@";
/// Begins a record; the next line names the module being attempted.
pub const ATTEMPT_MARKER: &str = "@=modsieve:attempt=@";
/// Terminates a record, directly after the name (clean load) or after a run
/// of error text (caught failure).
pub const ATTEMPT_END_MARKER: &str = "@=modsieve:attempt-end=@";
/// Terminates the whole batch; nothing may follow it.
pub const BATCH_END_MARKER: &str = "@=modsieve:batch-end=@";

/// Structural violations of the prober stream. Always fatal for the analysis
/// that observed them; never retried or recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("prober stream contains no startup marker")]
    MissingStartup,
    #[error("prober stream ended where a record or batch terminator was expected")]
    UnexpectedEnd,
    #[error("expected attempt or batch terminator, got {0:?}")]
    UnexpectedMarker(String),
    #[error("prober stream ended between an attempt marker and the module name")]
    TruncatedHeader,
    #[error("unexpected content after the batch terminator")]
    TrailingContent,
    #[error("record names module {0:?} which is not awaiting a result in this batch")]
    ForeignRecord(String),
    #[error("batch terminated but {0} submitted module(s) were never reported")]
    MissingRecords(usize),
}

#[derive(Debug, Serialize)]
struct WireEntry<'a> {
    id: &'a str,
    locator: String,
}

/// Encode a batch as the JSON manifest fed to the prober's stdin.
///
/// Locators are rendered with `Path::display`; the prober only needs a path
/// string to hand to its loader.
pub fn encode_batch(batch: &[(String, PathBuf)]) -> serde_json::Result<String> {
    let entries: Vec<WireEntry<'_>> = batch
        .iter()
        .map(|(id, locator)| WireEntry {
            id,
            locator: locator.display().to_string(),
        })
        .collect();
    let mut payload = serde_json::to_string(&entries)?;
    payload.push('\n');
    Ok(payload)
}

/// Forward-only view over the raw stream. Lines are only ever consumed, never
/// revisited; a line is complete only if its newline made it into the stream.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(stream: &'a str) -> Self {
        Self { rest: stream }
    }

    /// Consume and return the next newline-terminated line, without its
    /// newline. Returns `None` at end of input or on a truncated final line.
    fn next_line(&mut self) -> Option<&'a str> {
        let pos = self.rest.find('\n')?;
        let line = &self.rest[..pos];
        self.rest = &self.rest[pos + 1..];
        Some(line)
    }

    /// Scan forward for `marker` occurring as a complete line and consume
    /// through it. Returns the text before the marker line (empty if the
    /// marker is immediate), or `None` without consuming anything if the
    /// marker never appears — the truncation signal.
    fn take_until_line(&mut self, marker: &str) -> Option<&'a str> {
        let immediate = format!("{marker}\n");
        if let Some(rest) = self.rest.strip_prefix(immediate.as_str()) {
            self.rest = rest;
            return Some("");
        }
        let embedded = format!("\n{marker}\n");
        let pos = self.rest.find(embedded.as_str())?;
        let text = &self.rest[..pos];
        self.rest = &self.rest[pos + embedded.len()..];
        Some(text)
    }

    fn remainder(&self) -> &'a str {
        self.rest
    }
}

/// Decode a raw prober stream into per-module outcomes plus a terminal status.
///
/// Content before the startup marker is ignored (runtime banners, deprecation
/// warnings); the marker itself is mandatory. A stream that simply stops
/// mid-record is a crash, attributed to the module named in the open record.
/// Every other structural irregularity is a [`ProtocolError`].
pub fn decode(stream: &str) -> Result<BatchResult, ProtocolError> {
    let mut cursor = Cursor::new(stream);
    if cursor.take_until_line(STARTUP_MARKER).is_none() {
        return Err(ProtocolError::MissingStartup);
    }

    let mut entries = Vec::new();
    loop {
        let Some(line) = cursor.next_line() else {
            return Err(ProtocolError::UnexpectedEnd);
        };
        if line == BATCH_END_MARKER {
            if !cursor.remainder().trim().is_empty() {
                return Err(ProtocolError::TrailingContent);
            }
            return Ok(BatchResult {
                entries,
                status: BatchStatus::CompletedAll,
            });
        }
        if line != ATTEMPT_MARKER {
            return Err(ProtocolError::UnexpectedMarker(line.to_string()));
        }
        let Some(module) = cursor.next_line() else {
            return Err(ProtocolError::TruncatedHeader);
        };
        match cursor.take_until_line(ATTEMPT_END_MARKER) {
            Some("") => entries.push((module.to_string(), ProbeOutcome::Loadable)),
            Some(text) => entries.push((
                module.to_string(),
                ProbeOutcome::Forbidden {
                    error_text: text.to_string(),
                },
            )),
            None => {
                // The prober died somewhere inside this record. Whatever was
                // flushed before the death is the only diagnostic we get.
                return Ok(BatchResult {
                    entries,
                    status: BatchStatus::Crashed {
                        last_attempted: module.to_string(),
                        partial_text: cursor.remainder().to_string(),
                    },
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StreamBuilder;

    #[test]
    fn decode_empty_batch() {
        let stream = StreamBuilder::new().finish();
        let result = decode(&stream).expect("decode");
        assert!(result.entries.is_empty());
        assert_eq!(result.status, BatchStatus::CompletedAll);
    }

    #[test]
    fn decode_loadable_and_forbidden_records() {
        let stream = StreamBuilder::new()
            .loadable("alpha")
            .forbidden("beta", "parse error on line 3\nunexpected token")
            .loadable("gamma")
            .finish();

        let result = decode(&stream).expect("decode");
        assert_eq!(
            result.entries,
            vec![
                ("alpha".to_string(), ProbeOutcome::Loadable),
                (
                    "beta".to_string(),
                    ProbeOutcome::Forbidden {
                        error_text: "parse error on line 3\nunexpected token".to_string(),
                    }
                ),
                ("gamma".to_string(), ProbeOutcome::Loadable),
            ]
        );
        assert_eq!(result.status, BatchStatus::CompletedAll);
    }

    #[test]
    fn decode_crash_mid_error_text() {
        let stream = StreamBuilder::new()
            .loadable("alpha")
            .crash("beta", "segfault incom");

        let result = decode(&stream).expect("decode");
        assert_eq!(
            result.entries,
            vec![("alpha".to_string(), ProbeOutcome::Loadable)]
        );
        assert_eq!(
            result.status,
            BatchStatus::Crashed {
                last_attempted: "beta".to_string(),
                partial_text: "segfault incom".to_string(),
            }
        );
    }

    #[test]
    fn decode_crash_with_no_partial_text() {
        let stream = StreamBuilder::new().crash("alpha", "");
        let result = decode(&stream).expect("decode");
        assert_eq!(
            result.status,
            BatchStatus::Crashed {
                last_attempted: "alpha".to_string(),
                partial_text: String::new(),
            }
        );
    }

    #[test]
    fn decode_ignores_noise_before_startup() {
        let stream = format!(
            "Deprecated: runtime warning\n{}",
            StreamBuilder::new().loadable("alpha").finish()
        );
        let result = decode(&stream).expect("decode");
        assert_eq!(result.entries.len(), 1);
    }

    #[test]
    fn decode_missing_startup_is_fatal() {
        let err = decode("garbage with no markers\n").unwrap_err();
        assert_eq!(err, ProtocolError::MissingStartup);
    }

    #[test]
    fn decode_truncated_startup_marker_is_fatal() {
        // Marker must be a complete line; a death mid-marker is unattributable.
        let err = decode("@=modsieve:start").unwrap_err();
        assert_eq!(err, ProtocolError::MissingStartup);
    }

    #[test]
    fn decode_unexpected_marker_is_fatal() {
        let stream = format!("{STARTUP_MARKER}\nnot-a-marker\n");
        let err = decode(&stream).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedMarker("not-a-marker".to_string())
        );
    }

    #[test]
    fn decode_end_after_record_boundary_is_fatal() {
        // Death exactly between records cannot be pinned on any module.
        let stream = StreamBuilder::new().loadable("alpha").truncate();
        let err = decode(&stream).unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedEnd);
    }

    #[test]
    fn decode_end_before_module_name_is_fatal() {
        let stream = format!("{STARTUP_MARKER}\n{ATTEMPT_MARKER}\n");
        let err = decode(&stream).unwrap_err();
        assert_eq!(err, ProtocolError::TruncatedHeader);
    }

    #[test]
    fn decode_trailing_content_is_fatal() {
        let mut stream = StreamBuilder::new().loadable("alpha").finish();
        stream.push_str("leftover\n");
        let err = decode(&stream).unwrap_err();
        assert_eq!(err, ProtocolError::TrailingContent);
    }

    #[test]
    fn decode_tolerates_trailing_whitespace_after_terminator() {
        let mut stream = StreamBuilder::new().loadable("alpha").finish();
        stream.push('\n');
        let result = decode(&stream).expect("decode");
        assert_eq!(result.status, BatchStatus::CompletedAll);
    }

    #[test]
    fn decode_truncated_end_marker_is_partial_text() {
        // A half-written terminator is not a terminator.
        let stream = format!("{STARTUP_MARKER}\n{ATTEMPT_MARKER}\nalpha\n@=modsieve:attempt-e");
        let result = decode(&stream).expect("decode");
        assert_eq!(
            result.status,
            BatchStatus::Crashed {
                last_attempted: "alpha".to_string(),
                partial_text: "@=modsieve:attempt-e".to_string(),
            }
        );
    }

    #[test]
    fn encode_batch_produces_json_manifest() {
        let batch = vec![
            ("alpha".to_string(), PathBuf::from("src/alpha.mod")),
            ("beta".to_string(), PathBuf::from("src/beta.mod")),
        ];
        let payload = encode_batch(&batch).expect("encode");
        let parsed: serde_json::Value = serde_json::from_str(&payload).expect("parse");
        assert_eq!(parsed[0]["id"], "alpha");
        assert_eq!(parsed[1]["locator"], "src/beta.mod");
        assert!(payload.ends_with('\n'));
    }
}
