use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TakeoffError {
    #[error("cannot open drawing source {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("PDF parse failed for {path}: {reason}")]
    PdfParse { path: PathBuf, reason: String },

    #[error("PDF is encrypted: {0}")]
    Encrypted(PathBuf),

    #[error("no pages found in {0}")]
    EmptySource(PathBuf),

    #[error("page extraction failed: {0}")]
    Extraction(String),

    #[error("rasterizer failed on page {page_index} of {path}: {reason}")]
    RasterFailed {
        path: PathBuf,
        page_index: usize,
        reason: String,
    },

    #[error("OCR engine failed: {0}")]
    OcrFailed(String),

    #[error("vision model call failed: {0}")]
    VisionFailed(String),

    #[error("vision model returned no usable data: {0}")]
    VisionUnusable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TakeoffError {
    /// True for failures that abort the whole run. Everything else is
    /// stage-local: the caller records a warning and continues with an
    /// empty or zero result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TakeoffError::SourceUnreadable { .. }
                | TakeoffError::PdfParse { .. }
                | TakeoffError::Encrypted(_)
                | TakeoffError::EmptySource(_)
        )
    }
}
