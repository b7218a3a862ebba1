use anyhow::bail;
use clap::Parser;
use core::{num::NonZeroUsize, time::Duration};
use std::path::PathBuf;

/// Runtime configuration for the `keyseq-replay` binary.
///
/// These settings control how many documents are streamed concurrently, how
/// long each edit stream is, and which failure modes are injected. All values
/// are parsed from CLI arguments or environment variables (a `.env` file is
/// honored), with defaults suitable for a quick local run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keyseq-replay",
    version,
    about = "Replays streams of partial document edits through a per-key write coordinator"
)]
pub struct CliArgs {
    /// Number of documents streamed concurrently, one producer each.
    ///
    /// Environment variable: `NUM_DOCUMENTS`
    #[arg(long, env = "NUM_DOCUMENTS", default_value_t = 8)]
    pub documents: usize,

    /// Number of cumulative edits streamed per document. The last one is
    /// submitted as the document's final write.
    ///
    /// Environment variable: `EDITS_PER_DOCUMENT`
    #[arg(long, env = "EDITS_PER_DOCUMENT", default_value_t = 32)]
    pub edits_per_document: u64,

    /// Directory the document store writes `<doc-id>.json` files into. It is
    /// created if missing.
    ///
    /// Environment variable: `OUTPUT_DIR`
    #[arg(long, env = "OUTPUT_DIR", default_value = "replay-out")]
    pub output_dir: PathBuf,

    /// Upper bound on the random pause between two submissions of the same
    /// producer. `0` submits back to back.
    ///
    /// Environment variable: `MAX_JITTER_MS`
    #[arg(long, env = "MAX_JITTER_MS", default_value_t = 5)]
    pub max_jitter_ms: u64,

    /// Inject a failure into every Nth write of a document (counting from 1).
    /// `0` disables failure injection. Final writes never fail so that every
    /// document ends up verifiable.
    ///
    /// Environment variable: `FAIL_EVERY`
    #[arg(long, env = "FAIL_EVERY", default_value_t = 0)]
    pub fail_every: u64,

    /// After the final write, submit one more write per document. It must be
    /// reported as skipped and never reach the store.
    ///
    /// Environment variable: `LATE_WRITES`
    #[arg(long, env = "LATE_WRITES", default_value_t = false)]
    pub late_writes: bool,

    /// Maximum unsettled writes per document. When reached, the producer
    /// backs off until its document drains a little. Unbounded when unset.
    ///
    /// Environment variable: `MAX_PENDING`
    #[arg(long, env = "MAX_PENDING")]
    pub max_pending: Option<usize>,

    /// How long a producer waits for its document to drain after its final
    /// write before declaring the document stalled.
    ///
    /// Environment variable: `WAIT_TIMEOUT_SECS`
    #[arg(long, env = "WAIT_TIMEOUT_SECS", default_value_t = 30)]
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub documents: usize,
    pub edits_per_document: u64,
    pub output_dir: PathBuf,
    pub max_jitter: Duration,
    pub fail_every: Option<u64>,
    pub late_writes: bool,
    pub max_pending: Option<NonZeroUsize>,
    pub wait_timeout: Duration,
}

impl TryFrom<CliArgs> for ReplayConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.documents == 0 {
            bail!("NUM_DOCUMENTS must be greater than 0");
        }

        if args.edits_per_document == 0 {
            bail!("EDITS_PER_DOCUMENT must be greater than 0");
        }

        if args.fail_every == 1 {
            bail!("FAIL_EVERY = 1 would fail every write; use 0 to disable or a value >= 2");
        }

        if args.wait_timeout_secs == 0 {
            bail!("WAIT_TIMEOUT_SECS must be greater than 0");
        }

        let max_pending = match args.max_pending {
            None => None,
            Some(limit) => match NonZeroUsize::new(limit) {
                Some(limit) => Some(limit),
                None => bail!("MAX_PENDING must be greater than 0 when set"),
            },
        };

        Ok(Self {
            documents: args.documents,
            edits_per_document: args.edits_per_document,
            output_dir: args.output_dir,
            max_jitter: Duration::from_millis(args.max_jitter_ms),
            fail_every: (args.fail_every > 0).then_some(args.fail_every),
            late_writes: args.late_writes,
            max_pending,
            wait_timeout: Duration::from_secs(args.wait_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["keyseq-replay"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ReplayConfig::try_from(args(&[])).unwrap();
        assert!(config.documents > 0);
        assert!(config.edits_per_document > 0);
        assert_eq!(config.fail_every, None);
        assert_eq!(config.max_pending, None);
        assert!(!config.late_writes);
    }

    #[test]
    fn flags_are_applied() {
        let config = ReplayConfig::try_from(args(&[
            "--documents",
            "3",
            "--edits-per-document",
            "10",
            "--output-dir",
            "/tmp/replay",
            "--max-jitter-ms",
            "0",
            "--fail-every",
            "4",
            "--late-writes",
            "--max-pending",
            "2",
            "--wait-timeout-secs",
            "7",
        ]))
        .unwrap();

        assert_eq!(config.documents, 3);
        assert_eq!(config.edits_per_document, 10);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/replay"));
        assert_eq!(config.max_jitter, Duration::ZERO);
        assert_eq!(config.fail_every, Some(4));
        assert!(config.late_writes);
        assert_eq!(config.max_pending, NonZeroUsize::new(2));
        assert_eq!(config.wait_timeout, Duration::from_secs(7));
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(ReplayConfig::try_from(args(&["--documents", "0"])).is_err());
        assert!(ReplayConfig::try_from(args(&["--edits-per-document", "0"])).is_err());
        assert!(ReplayConfig::try_from(args(&["--fail-every", "1"])).is_err());
        assert!(ReplayConfig::try_from(args(&["--max-pending", "0"])).is_err());
        assert!(ReplayConfig::try_from(args(&["--wait-timeout-secs", "0"])).is_err());
    }
}
