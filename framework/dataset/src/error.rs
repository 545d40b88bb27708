use std::path::PathBuf;

/// The dataset could not be loaded. Always fatal, the run is aborted before any virtual user
/// starts.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("Dataset not found: {path}")]
    NotFound { path: PathBuf },
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed dataset: {0}")]
    Malformed(#[from] csv::Error),
    #[error("Dataset is missing the required column [{column}]")]
    MissingColumn { column: &'static str },
    #[error("Dataset has no usable rows ({dropped} incomplete rows dropped)")]
    Empty { dropped: usize },
}
