//! Backend adapters that turn PDF bytes into a [`RawDocument`].
//!
//! ```text
//!              ┌──────────────────────┐
//!   bytes ───▶ │ RawPageSource        │ ───▶ RawDocument (page space)
//!              └──────────────────────┘
//!                 ▲               ▲
//!   cloud::DocumentIntelligence   direct::DirectExtractor
//!   (REST, one call per doc)      (PdfParser on the blocking pool)
//! ```
//!
//! The assembler only ever talks to the trait, so tests swap in mocks and
//! callers can plug in another cloud analyser or parser.

pub mod cloud;
pub mod direct;
pub mod pdfium;

use crate::error::BackendError;
use crate::raw::{BackendKind, RawDocument};
use async_trait::async_trait;

/// Anything that can analyze a whole PDF into raw pages.
#[async_trait]
pub trait RawPageSource: Send + Sync {
    /// Which route this source represents in the summary.
    fn kind(&self) -> BackendKind;

    /// Analyze the document. One call per document; implementations do not
    /// retry.
    async fn analyze(&self, bytes: &[u8]) -> Result<RawDocument, BackendError>;
}

pub use cloud::DocumentIntelligenceClient;
pub use direct::{DirectExtractor, ParsedPage, PdfParser};
pub use pdfium::PdfiumParser;
