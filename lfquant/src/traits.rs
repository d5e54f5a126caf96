use std::path::Path;

use peakindex::Ms1ScanInfo;

/// Where the centroided MS1 data of a run comes from.
///
/// The engine only ever asks for the MS1 scans of one file at a time, in
/// ascending scan order, and drops the iterator as soon as the run's peak
/// index is built. Readers for real vendor formats live outside this crate;
/// the engine is generic over this trait.
pub trait SpectrumSource {
    type ScanIter: Iterator<Item = (Ms1ScanInfo, Vec<(f64, f64)>)>;

    /// Open a run and stream its MS1 scans as `(scan info, [(mz, intensity)])`.
    fn ms1_scans(&self, path: &Path) -> Result<Self::ScanIter, SourceError>;
}

/// Failure to open or read one run. Always recoverable at the engine level:
/// the run is skipped with a warning.
#[derive(Debug)]
pub enum SourceError {
    Unreadable {
        path: std::path::PathBuf,
        msg: String,
    },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SourceError {}
