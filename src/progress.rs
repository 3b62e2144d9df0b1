//! Progress-callback trait for per-page normalization events.
//!
//! Inject an [`Arc<dyn NormalizeProgressCallback>`] via
//! [`crate::config::NormalizerConfigBuilder::progress_callback`] to receive
//! events as the assembler commits each page.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfstruct::{NormalizeProgressCallback, NormalizerConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     committed: AtomicUsize,
//! }
//!
//! impl NormalizeProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, sentence_count: usize) {
//!         self.committed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} sentences", page_num, total_pages, sentence_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { committed: AtomicUsize::new(0) });
//!
//! let config = NormalizerConfig::builder()
//!     .progress_callback(counter as Arc<dyn NormalizeProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::raw::BackendKind;
use std::sync::Arc;

/// Called by the assembler as it processes each page.
///
/// Pages are preprocessed on tokio's blocking pool, so implementations must
/// be `Send + Sync`. All methods default to no-ops.
pub trait NormalizeProgressCallback: Send + Sync {
    /// Called once the backend has produced raw pages.
    fn on_normalize_start(&self, total_pages: usize, route: BackendKind) {
        let _ = (total_pages, route);
    }

    /// Called before a page is preprocessed. `page_num` is 1-indexed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after a page has been committed to the document.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, sentence_count: usize) {
        let _ = (page_num, total_pages, sentence_count);
    }

    /// Called when a finished page is thrown away because of cancellation.
    fn on_page_discarded(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once after the last page.
    fn on_normalize_complete(&self, total_pages: usize, committed_pages: usize) {
        let _ = (total_pages, committed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl NormalizeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::NormalizerConfig`].
pub type ProgressCallback = Arc<dyn NormalizeProgressCallback>;
