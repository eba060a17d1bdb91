//! Prober abstraction for out-of-process load attempts.
//!
//! The [`ProbeExecutor`] trait decouples the isolation engine from the actual
//! prober backend (a configured external command). Tests use scripted probers
//! that return predetermined streams without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::codec::encode_batch;
use crate::io::config::SieveConfig;
use crate::io::process::run_with_timeout;

/// Environment variable set for self-inspect probes.
pub const SELF_INSPECT_ENV: &str = "MODSIEVE_SELF";

/// Abstraction over prober backends.
///
/// `run` must attempt each batch entry strictly in the given order, emit the
/// marker protocol on its output, and simply cease output (no terminator) if
/// the hosting process dies. The returned string is the raw stream up to that
/// point.
pub trait ProbeExecutor {
    fn run(&self, batch: &[(String, PathBuf)]) -> Result<String>;
}

/// Prober that spawns the configured external command per batch.
///
/// The batch manifest is written to the child's stdin; stdout is the protocol
/// stream. Exit status is deliberately not inspected — crash detection belongs
/// to the codec's truncation rule, and a prober that exits nonzero after a
/// clean batch terminator still produced a complete batch.
pub struct ProcessProber {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    self_inspect: bool,
}

impl ProcessProber {
    pub fn new(
        command: Vec<String>,
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
        self_inspect: bool,
    ) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
            self_inspect,
        }
    }

    pub fn from_config(cfg: &SieveConfig, workdir: &Path, self_inspect: bool) -> Self {
        Self::new(
            cfg.prober.command.clone(),
            workdir,
            Duration::from_secs(cfg.probe_timeout_secs),
            cfg.probe_output_limit_bytes,
            self_inspect,
        )
    }
}

impl ProbeExecutor for ProcessProber {
    #[instrument(skip_all, fields(batch_len = batch.len(), timeout_secs = self.timeout.as_secs()))]
    fn run(&self, batch: &[(String, PathBuf)]) -> Result<String> {
        let payload = encode_batch(batch).context("encode batch manifest")?;

        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("prober command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]).current_dir(&self.workdir);
        if self.self_inspect {
            cmd.env(SELF_INSPECT_ENV, "1");
        }

        debug!(prober = %program, "starting prober run");
        let output = run_with_timeout(
            cmd,
            Some(payload.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run prober")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "prober hung, killed");
            return Err(anyhow!("prober timed out after {:?}", self.timeout));
        }
        if output.stdout_truncated > 0 {
            // A clipped stream is indistinguishable from a crash; refuse to
            // guess rather than misclassify the module under attempt.
            return Err(anyhow!(
                "prober output exceeded limit of {} bytes ({} dropped); raise probe_output_limit_bytes",
                self.output_limit_bytes,
                output.stdout_truncated
            ));
        }

        debug!(exit_code = ?output.status.code(), bytes = output.stdout.len(), "prober run finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::decode;
    use crate::core::types::BatchStatus;
    use crate::test_support::StreamBuilder;
    use std::fs;

    fn script_prober(dir: &Path, script: &str, timeout: Duration) -> ProcessProber {
        fs::write(dir.join("prober.sh"), script).expect("write script");
        ProcessProber::new(
            vec!["sh".to_string(), "prober.sh".to_string()],
            dir,
            timeout,
            100_000,
            false,
        )
    }

    /// End to end through a real child process: manifest in, stream out.
    #[test]
    fn process_prober_round_trips_a_stream() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stream = StreamBuilder::new().loadable("alpha").finish();
        fs::write(temp.path().join("stream.txt"), &stream).expect("write stream");

        let prober = script_prober(temp.path(), "cat stream.txt\n", Duration::from_secs(5));
        let batch = vec![("alpha".to_string(), PathBuf::from("alpha.mod"))];
        let raw = prober.run(&batch).expect("run");

        let result = decode(&raw).expect("decode");
        assert_eq!(result.status, BatchStatus::CompletedAll);
        assert_eq!(result.entries.len(), 1);
    }

    /// The prober reads the batch manifest from stdin.
    #[test]
    fn process_prober_feeds_manifest_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prober = script_prober(temp.path(), "cat > manifest.json\n", Duration::from_secs(5));
        let batch = vec![("alpha".to_string(), PathBuf::from("src/alpha.mod"))];
        prober.run(&batch).expect("run");

        let manifest = fs::read_to_string(temp.path().join("manifest.json")).expect("read");
        assert!(manifest.contains("\"alpha\""));
        assert!(manifest.contains("src/alpha.mod"));
    }

    /// A hanging prober is killed and surfaced as an error, never a crash.
    #[test]
    fn process_prober_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prober = script_prober(temp.path(), "sleep 30\n", Duration::from_millis(100));
        let err = prober
            .run(&[("alpha".to_string(), PathBuf::from("alpha.mod"))])
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    /// A dead prober's partial stream is returned as-is for the codec.
    #[test]
    fn process_prober_returns_truncated_stream_on_death() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stream = StreamBuilder::new().crash("alpha", "boo");
        fs::write(temp.path().join("stream.txt"), &stream).expect("write stream");

        let prober = script_prober(
            temp.path(),
            "cat stream.txt; exit 139\n",
            Duration::from_secs(5),
        );
        let raw = prober
            .run(&[("alpha".to_string(), PathBuf::from("alpha.mod"))])
            .expect("run");

        let result = decode(&raw).expect("decode");
        assert_eq!(
            result.status,
            BatchStatus::Crashed {
                last_attempted: "alpha".to_string(),
                partial_text: "boo".to_string(),
            }
        );
    }
}
