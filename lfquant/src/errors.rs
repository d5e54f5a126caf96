use std::path::PathBuf;

use peakindex::PeakIndexError;

#[derive(Debug)]
pub enum LfqError {
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    /// Peak index build, query, or (de)serialization failed in a way that
    /// prevents further progress.
    Index(PeakIndexError),
    /// The PEP classifier failed to train or predict.
    Classifier {
        msg: String,
    },
    /// No runs were supplied to the engine.
    NoRuns,
    /// The worker thread pool could not be built.
    ThreadPool {
        msg: String,
    },
}

impl std::fmt::Display for LfqError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for LfqError {}

impl From<PeakIndexError> for LfqError {
    fn from(x: PeakIndexError) -> Self {
        Self::Index(x)
    }
}

impl From<std::io::Error> for LfqError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

pub type Result<T> = std::result::Result<T, LfqError>;
