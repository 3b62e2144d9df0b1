//! Error types for the edgequake-pdfstruct library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`NormalizeError`]: **Fatal**: no structure can be produced at all
//!   (bad input file, the local parser cannot open the PDF, caller cancelled).
//!   Returned as `Err(NormalizeError)` from the top-level `normalize*`
//!   functions.
//!
//! * [`BackendError`]: **Recovered**: one backend failed (cloud analyser
//!   unreachable, malformed response, parser glitch). The assembler logs it
//!   and takes the other route; it only surfaces as fatal when the direct
//!   extraction path itself cannot run.
//!
//! * [`SegmentError`]: **Degraded**: the sentence splitter failed for one
//!   scope. The scope simply gets no sentences.
//!
//! Downstream classification must always receive *some* structure, so the
//! recoverable kinds never abort a document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfstruct library.
#[derive(Debug, Error)]
pub enum NormalizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// No backend could produce any structure for the document.
    #[error("Could not extract document structure: {source}")]
    ExtractionFailed {
        #[source]
        source: BackendError,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium in the working directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller raised the cancellation flag.
    #[error("Normalization cancelled after {completed_pages} committed pages")]
    Cancelled { completed_pages: usize },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not write the JSON output.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of one backend. Never fatal by itself.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// No endpoint/key configured for the cloud analyser.
    #[error("Cloud analysis backend is not configured: {hint}")]
    CloudNotConfigured { hint: String },

    /// Transport-level failure talking to the cloud analyser.
    #[error("HTTP error calling cloud analysis: {0}")]
    Http(String),

    /// Cloud analyser answered with a non-success status.
    #[error("Cloud analysis returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Whole analyze operation exceeded its deadline.
    #[error("Cloud analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The analysis operation finished with status `failed`.
    #[error("Cloud analysis failed: {0}")]
    AnalysisFailed(String),

    /// Response body could not be understood.
    #[error("Malformed backend response: {0}")]
    Malformed(String),

    /// The local parser could not read the document.
    #[error("PDF parse error: {0}")]
    Parse(String),

    /// Password missing or wrong for the local parser.
    #[error("PDF password rejected (password provided: {provided})")]
    Password { provided: bool },

    /// pdfium could not be loaded.
    #[error("pdfium unavailable: {0}")]
    Binding(String),

    /// A blocking task panicked or was cancelled.
    #[error("Backend task failed: {0}")]
    Task(String),
}

/// The general-purpose sentence splitter failed.
#[derive(Debug, Clone, Error)]
#[error("Sentence splitter failed: {0}")]
pub struct SegmentError(pub String);

impl From<BackendError> for NormalizeError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Password { provided: true } => NormalizeError::WrongPassword,
            BackendError::Password { provided: false } => NormalizeError::PasswordRequired,
            BackendError::Binding(detail) => NormalizeError::PdfiumBindingFailed(detail),
            other => NormalizeError::ExtractionFailed { source: other },
        }
    }
}
