//! # edgequake-pdfstruct
//!
//! Turn a PDF into one hierarchical document model
//! (pages → lines → paragraphs → sentences, plus tables and key/value pairs)
//! with every box in unit-square coordinates, whether the layout came from a
//! cloud document-analysis service or from the PDF's own text layer.
//!
//! ## Routing
//!
//! Born-digital PDFs carry an exact text layer that is read locally. Scanned
//! PDFs carry pictures of text and go to the cloud analyser. The text layer is
//! probed first and the cloud is only called when the probe rejects it. If
//! the cloud call fails for any reason the local route takes over.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Probe      parse locally, look for scanned pages (spawn_blocking)
//!  ├─ 2. Backend    cloud analysis (REST submit + poll) or direct extraction
//!  ├─ 3. Merge      fold fragment blocks (direct only)
//!  ├─ 4. Associate  link cloud lines to cloud paragraphs
//!  ├─ 5. Segment    sentence split + list/abbreviation corrections
//!  ├─ 6. Tables     normalize table, cell and key/value geometry
//!  └─ 7. Assemble   commit pages in order into a Document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfstruct::{normalize_path, NormalizerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Cloud analysis enabled when AZURE_DOCUMENT_INTELLIGENCE_* are set
//!     let config = NormalizerConfig::builder().cloud_from_env().build()?;
//!     let doc = normalize_path("manual.pdf", &config).await?;
//!     for s in doc.sentences.iter().take(5) {
//!         println!("p{} {}", s.page_number, s.content);
//!     }
//!     eprintln!("route: {}, ocr applied: {}", doc.summary.route, doc.summary.ocr_applied);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfstruct` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfstruct = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod raw;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{DirectExtractor, DocumentIntelligenceClient, ParsedPage, PdfParser, PdfiumParser, RawPageSource};
pub use config::{CancelFlag, CloudConfig, NormalizerConfig, NormalizerConfigBuilder, Thresholds};
pub use error::{BackendError, NormalizeError, SegmentError};
pub use geometry::{BoundingPolygon, RawPolygon};
pub use normalize::{
    normalize, normalize_path, normalize_sync, normalize_to_file, AssemblyState, DocumentAccumulator, Normalizer,
};
pub use output::{
    Cell, Document, KeyValuePair, Line, NormalizationSummary, Page, Paragraph, ParagraphMetadata, Sentence, Span,
    SpanType, Table, Word,
};
pub use pipeline::segment::{SentenceSegmenter, SentenceSplitter, UnicodeSentenceSplitter};
pub use progress::{NoopProgressCallback, NormalizeProgressCallback, ProgressCallback};
pub use raw::{BackendKind, RawDocument, RawLayout, RawPage};
