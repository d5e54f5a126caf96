use std::collections::HashMap;
use std::path::{
    Path,
    PathBuf,
};

use peakindex::Ms1ScanInfo;

use crate::traits::{
    SourceError,
    SpectrumSource,
};

/// A spectrum source backed by scans held in memory, keyed by file path.
///
/// Used by the test suite to build synthetic runs, and handy for embedding
/// the engine behind a reader that has already materialized its scans.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    runs: HashMap<PathBuf, Vec<(Ms1ScanInfo, Vec<(f64, f64)>)>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_run(
        &mut self,
        path: impl Into<PathBuf>,
        scans: Vec<(Ms1ScanInfo, Vec<(f64, f64)>)>,
    ) {
        self.runs.insert(path.into(), scans);
    }
}

impl SpectrumSource for InMemorySource {
    type ScanIter = std::vec::IntoIter<(Ms1ScanInfo, Vec<(f64, f64)>)>;

    fn ms1_scans(&self, path: &Path) -> Result<Self::ScanIter, SourceError> {
        match self.runs.get(path) {
            Some(scans) => Ok(scans.clone().into_iter()),
            None => Err(SourceError::Unreadable {
                path: path.to_path_buf(),
                msg: "no such run registered".to_string(),
            }),
        }
    }
}
