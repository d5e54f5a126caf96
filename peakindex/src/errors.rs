use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PeakIndexError {
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Serialization {
        source: bincode::Error,
        context: &'static str,
    },
    EmptyIndex,
    ScanOutOfBounds {
        ms1_index: u32,
        num_scans: usize,
    },
}

impl Display for PeakIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for PeakIndexError {}

impl From<std::io::Error> for PeakIndexError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<bincode::Error> for PeakIndexError {
    fn from(source: bincode::Error) -> Self {
        Self::Serialization {
            source,
            context: "",
        }
    }
}

pub type Result<T> = std::result::Result<T, PeakIndexError>;
