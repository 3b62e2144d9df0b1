//! Document assembly: route the document through a backend, then build every
//! page and accumulate the result.
//!
//! ## Route selection
//!
//! ```text
//! Unloaded ─▶ Probing ─┬─▶ CloudAnalyzing ──┬─────────────▶ Preprocessing ─▶ Ready
//!                      │                    └─▶ (failure) ─┐
//!                      └─▶ DirectExtracting ◀──────────────┘
//! ```
//!
//! The probe parses the document once with the local parser. When that text
//! layer is trustworthy the parsed pages are reused as the direct-extraction
//! result, so a born-digital PDF is parsed exactly once and never leaves the
//! machine. A cloud failure of any kind (unreachable, non-success status,
//! malformed body, timeout, not configured) is logged and the direct route
//! takes over; it never becomes an error.
//!
//! ## Commit order
//!
//! Pages are built on the blocking pool one at a time and each
//! [`PageOutcome`] is committed to the [`DocumentAccumulator`] in page order.
//! Only the accumulator assigns document-level positions (`paragraph_index`).

use crate::backend::direct::into_raw_document;
use crate::backend::{DirectExtractor, DocumentIntelligenceClient, RawPageSource};
use crate::config::{NormalizerConfig, ENV_ENDPOINT, ENV_KEY};
use crate::error::{BackendError, NormalizeError};
use crate::output::{Document, KeyValuePair, NormalizationSummary};
use crate::pipeline::page::{build_page, PageOutcome};
use crate::pipeline::segment::SentenceSegmenter;
use crate::pipeline::{input, probe, tables};
use crate::raw::{BackendKind, RawDocument};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── State machine ────────────────────────────────────────────────────────

/// Phase of one document assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    Unloaded,
    Probing,
    CloudAnalyzing,
    DirectExtracting,
    Preprocessing,
    Ready,
}

impl AssemblyState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: AssemblyState) -> bool {
        use AssemblyState::*;
        matches!(
            (self, next),
            (Unloaded, Probing)
                | (Probing, CloudAnalyzing)
                | (Probing, DirectExtracting)
                | (CloudAnalyzing, DirectExtracting)
                | (CloudAnalyzing, Preprocessing)
                | (DirectExtracting, Preprocessing)
                | (Preprocessing, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == AssemblyState::Ready
    }
}

/// Current state plus every state visited, in order.
#[derive(Debug)]
struct Assembly {
    state: AssemblyState,
    trace: Vec<AssemblyState>,
}

impl Assembly {
    fn new() -> Self {
        Self {
            state: AssemblyState::Unloaded,
            trace: vec![AssemblyState::Unloaded],
        }
    }

    fn advance(&mut self, next: AssemblyState) -> Result<(), NormalizeError> {
        if !self.state.can_transition_to(next) {
            return Err(NormalizeError::Internal(format!(
                "illegal assembly transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!("Assembly: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.trace.push(next);
        Ok(())
    }
}

// ── Accumulator ──────────────────────────────────────────────────────────

/// Collects committed pages into a [`Document`].
#[derive(Debug, Default)]
pub struct DocumentAccumulator {
    document: Document,
    merged_blocks: usize,
}

impl DocumentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one page. Page-local paragraph positions are shifted past the
    /// paragraphs already committed.
    pub fn commit(&mut self, outcome: PageOutcome) {
        let PageOutcome {
            page,
            paragraphs,
            sentences,
            merged_blocks,
        } = outcome;

        let offset = self.document.paragraphs.len();
        let shift = |index: Option<usize>| index.map(|i| i + offset);

        self.document.lines.extend(page.lines.iter().cloned());
        self.document.tables.extend(page.tables.iter().cloned());
        self.document.paragraphs.extend(paragraphs.into_iter().map(|mut p| {
            p.paragraph_index += offset;
            for s in &mut p.sentences {
                s.paragraph_index = shift(s.paragraph_index);
            }
            p
        }));
        self.document.sentences.extend(sentences.into_iter().map(|mut s| {
            s.paragraph_index = shift(s.paragraph_index);
            s
        }));
        self.document.pages.push(page);
        self.merged_blocks += merged_blocks;
    }

    pub fn committed_pages(&self) -> usize {
        self.document.pages.len()
    }

    pub fn merged_blocks(&self) -> usize {
        self.merged_blocks
    }

    pub fn finish(mut self, key_value_pairs: Vec<KeyValuePair>, summary: NormalizationSummary) -> Document {
        self.document.key_value_pairs = key_value_pairs;
        self.document.summary = summary;
        self.document
    }
}

// ── Normalizer ───────────────────────────────────────────────────────────

/// Drives one document through probe, backend and per-page preprocessing.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfstruct::{Normalizer, NormalizerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = NormalizerConfig::builder().cloud_from_env().build()?;
/// let bytes = std::fs::read("manual.pdf")?;
/// let doc = Normalizer::new(config).normalize(&bytes).await?;
/// println!("{} sentences via {}", doc.sentences.len(), doc.summary.route);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
    direct: DirectExtractor,
    cloud: Option<Arc<dyn RawPageSource>>,
    segmenter: SentenceSegmenter,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.config)
            .field("direct", &self.direct)
            .field("cloud", &self.cloud.as_ref().map(|c| c.kind()))
            .finish()
    }
}

impl Normalizer {
    /// Normalizer over pdfium and, when `config.cloud` is set, the Document
    /// Intelligence REST client.
    pub fn new(config: NormalizerConfig) -> Self {
        let direct = DirectExtractor::pdfium(config.thresholds.block_gap_factor, config.password.clone());
        let cloud = config.cloud.clone().and_then(|cloud| match DocumentIntelligenceClient::new(cloud) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn RawPageSource>),
            Err(e) => {
                warn!("Cloud analysis client unavailable, using direct extraction only: {}", e);
                None
            }
        });
        Self::with_backends(config, direct, cloud)
    }

    /// Normalizer over caller-supplied backends.
    pub fn with_backends(
        config: NormalizerConfig,
        direct: DirectExtractor,
        cloud: Option<Arc<dyn RawPageSource>>,
    ) -> Self {
        let segmenter = SentenceSegmenter::new(config.thresholds.list_marker_max_len);
        Self {
            config,
            direct,
            cloud,
            segmenter,
        }
    }

    /// Replace the sentence segmenter.
    pub fn with_segmenter(mut self, segmenter: SentenceSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize one PDF held in memory.
    ///
    /// # Errors
    /// Only when no structure can be produced at all (the bytes are not a
    /// PDF, or the local parser cannot open the document and the cloud route
    /// did not succeed) or when the caller raised the cancel flag.
    pub async fn normalize(&self, bytes: &[u8]) -> Result<Document, NormalizeError> {
        let started = Instant::now();
        input::check_magic("<bytes>", bytes)?;

        let mut assembly = Assembly::new();

        // ── Probe ────────────────────────────────────────────────────────
        assembly.advance(AssemblyState::Probing)?;
        let parsed = self.direct.parse_pages(bytes).await;
        let probe = probe::probe_pages(
            parsed.as_ref().map(Vec::as_slice),
            self.config.thresholds.min_chars_per_page,
        );

        if self.config.is_cancelled() {
            info!("Normalization cancelled before any page was built");
            return Err(NormalizeError::Cancelled { completed_pages: 0 });
        }

        // ── Backend ──────────────────────────────────────────────────────
        let mut fallback_reason = None;
        let mut raw = None;
        if probe.needs_ocr {
            assembly.advance(AssemblyState::CloudAnalyzing)?;
            match self.analyze_cloud(bytes).await {
                Ok(doc) => raw = Some(doc),
                Err(e) => {
                    warn!("Cloud analysis failed, falling back to direct extraction: {}", e);
                    fallback_reason = Some(e.to_string());
                }
            }
        }
        let raw = match raw {
            Some(doc) => doc,
            None => {
                assembly.advance(AssemblyState::DirectExtracting)?;
                into_raw_document(parsed?)
            }
        };

        let route = raw.source;
        let RawDocument {
            pages,
            key_value_pairs,
            ..
        } = raw;
        info!("Normalizing {} page(s) via {}", pages.len(), route);

        // ── Preprocessing ────────────────────────────────────────────────
        assembly.advance(AssemblyState::Preprocessing)?;
        let key_value_pairs = tables::normalize_key_value_pairs(&key_value_pairs, &pages);

        let total = pages.len();
        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_normalize_start(total, route);
        }

        let mut acc = DocumentAccumulator::new();
        for raw_page in pages {
            let page_num = raw_page.page_number as usize;
            if self.config.is_cancelled() {
                info!("Normalization cancelled before page {}", page_num);
                return Err(NormalizeError::Cancelled {
                    completed_pages: acc.committed_pages(),
                });
            }
            if let Some(cb) = callback {
                cb.on_page_start(page_num, total);
            }

            let thresholds = self.config.thresholds.clone();
            let segmenter = self.segmenter.clone();
            let outcome = tokio::task::spawn_blocking(move || build_page(raw_page, &thresholds, &segmenter))
                .await
                .map_err(|e| NormalizeError::Internal(format!("Page {} task failed: {}", page_num, e)))?;

            if self.config.is_cancelled() {
                info!("Normalization cancelled, discarding page {}", page_num);
                if let Some(cb) = callback {
                    cb.on_page_discarded(page_num, total);
                }
                return Err(NormalizeError::Cancelled {
                    completed_pages: acc.committed_pages(),
                });
            }

            let sentence_count = outcome.sentences.len();
            acc.commit(outcome);
            if let Some(cb) = callback {
                cb.on_page_complete(page_num, total, sentence_count);
            }
        }

        assembly.advance(AssemblyState::Ready)?;
        if let Some(cb) = callback {
            cb.on_normalize_complete(total, acc.committed_pages());
        }

        let summary = NormalizationSummary {
            route,
            probe_needs_ocr: probe.needs_ocr,
            probe_failed: probe.probe_failed,
            pages_needing_ocr: probe.pages_needing_ocr,
            ocr_applied: route == BackendKind::CloudAnalysis,
            fallback_reason,
            merged_blocks: acc.merged_blocks(),
            state_trace: assembly.trace,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Normalization complete: {} page(s), {} paragraph(s), {}ms",
            acc.committed_pages(),
            acc.document.paragraphs.len(),
            summary.duration_ms
        );
        Ok(acc.finish(key_value_pairs, summary))
    }

    async fn analyze_cloud(&self, bytes: &[u8]) -> Result<RawDocument, BackendError> {
        let cloud = self.cloud.as_ref().ok_or_else(|| BackendError::CloudNotConfigured {
            hint: format!("set {} and {}", ENV_ENDPOINT, ENV_KEY),
        })?;
        let doc = cloud.analyze(bytes).await?;
        if doc.pages.is_empty() {
            return Err(BackendError::Malformed("analysis returned no pages".into()));
        }
        Ok(doc)
    }
}

// ── Free functions ───────────────────────────────────────────────────────

/// Normalize PDF bytes with a [`Normalizer`] built from `config`.
pub async fn normalize(bytes: &[u8], config: &NormalizerConfig) -> Result<Document, NormalizeError> {
    Normalizer::new(config.clone()).normalize(bytes).await
}

/// Normalize a local PDF file or an HTTP(S) URL.
pub async fn normalize_path(input_str: impl AsRef<str>, config: &NormalizerConfig) -> Result<Document, NormalizeError> {
    let input_str = input_str.as_ref();
    info!("Starting normalization: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    normalize(&resolved.bytes, config).await
}

/// Normalize and write the document as JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn normalize_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &NormalizerConfig,
) -> Result<NormalizationSummary, NormalizeError> {
    let doc = normalize_path(input_str, config).await?;
    write_json(&doc, output_path.as_ref()).await?;
    Ok(doc.summary)
}

/// Write `doc` as pretty JSON via a temp file and rename.
pub async fn write_json(doc: &Document, path: &Path) -> Result<(), NormalizeError> {
    let write_failed = |source| NormalizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(doc).map_err(|e| NormalizeError::Internal(format!("serialize: {e}")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

/// Synchronous wrapper around [`normalize`].
///
/// Creates a temporary tokio runtime internally.
pub fn normalize_sync(bytes: &[u8], config: &NormalizerConfig) -> Result<Document, NormalizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NormalizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(normalize(bytes, config))
}
