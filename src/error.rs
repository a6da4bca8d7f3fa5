use std::fmt;
use std::path::PathBuf;

use log::info;

/// Errors raised while reading annotations and PSI sources.
///
/// Only `Io`, `Schema` and `Index` abort a command. `Parse` and `MissingInput`
/// are raised per row/file and the callers skip the offending unit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("parse error ({context}): {message}")]
    Parse { context: String, message: String },

    #[error("missing input: {0}")]
    MissingInput(PathBuf),

    #[error("unrecognized schema in {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("site index error: {0}")]
    Index(String),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Best-effort accounting of what a run read, skipped and dropped.
///
/// Workers build their own summary and the coordinator merges them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub undefined_psi: usize,
    pub files_missing: usize,
    pub units_failed: usize,
    pub empty_matches: usize,
    pub single_exon: usize,
    pub rows_emitted: usize,
}

impl RunSummary {
    pub fn merge(&mut self, other: &RunSummary) {
        self.rows_read += other.rows_read;
        self.rows_skipped += other.rows_skipped;
        self.undefined_psi += other.undefined_psi;
        self.files_missing += other.files_missing;
        self.units_failed += other.units_failed;
        self.empty_matches += other.empty_matches;
        self.single_exon += other.single_exon;
        self.rows_emitted += other.rows_emitted;
    }

    pub fn log(&self, label: &str) {
        info!("{label}: {self}");
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={}, emitted={}, skipped={}, undefined_psi={}, missing_files={}, failed_units={}, no_match={}, single_exon={}",
            self.rows_read,
            self.rows_emitted,
            self.rows_skipped,
            self.undefined_psi,
            self.files_missing,
            self.units_failed,
            self.empty_matches,
            self.single_exon
        )
    }
}
