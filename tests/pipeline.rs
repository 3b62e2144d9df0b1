//! Routing and assembly tests with mock backends.
//!
//! The local parser and the cloud analyser are replaced by in-memory mocks,
//! so these run without pdfium or network access.

use async_trait::async_trait;
use edgequake_pdfstruct::raw::{
    BlockKind, RawBlock, RawBlockLine, RawKeyValuePair, RawParagraph, RawRegion, RawSpan,
};
use edgequake_pdfstruct::{
    AssemblyState, BackendError, BackendKind, CancelFlag, DirectExtractor, NormalizeError,
    NormalizeProgressCallback, Normalizer, NormalizerConfig, ParagraphMetadata, ParsedPage, PdfParser,
    RawDocument, RawLayout, RawPage, RawPageSource, RawPolygon,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

const PDF: &[u8] = b"%PDF-1.7\n% mock";

const STEP_TEXT: &str = "Turn the dial clockwise until the indicator light turns green and the pump starts. \
Then wait for full pressure before opening the outlet valve.";

// ── Mocks ────────────────────────────────────────────────────────────────────

struct FixedParser(Result<Vec<ParsedPage>, BackendError>);

impl PdfParser for FixedParser {
    fn parse(&self, _bytes: &[u8], _password: Option<&str>) -> Result<Vec<ParsedPage>, BackendError> {
        self.0.clone()
    }
}

struct CountingCloud {
    calls: AtomicUsize,
    result: Result<RawDocument, BackendError>,
}

impl CountingCloud {
    fn new(result: Result<RawDocument, BackendError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawPageSource for CountingCloud {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudAnalysis
    }

    async fn analyze(&self, _bytes: &[u8]) -> Result<RawDocument, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    flag: CancelFlag,
    cancel_on_start_of: Option<usize>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

impl NormalizeProgressCallback for Recorder {
    fn on_normalize_start(&self, total_pages: usize, route: BackendKind) {
        self.push(format!("start {total_pages} {route}"));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.push(format!("page_start {page_num}"));
        if self.cancel_on_start_of == Some(page_num) {
            self.flag.cancel();
        }
    }

    fn on_page_complete(&self, page_num: usize, _total_pages: usize, sentence_count: usize) {
        self.push(format!("page_complete {page_num} {sentence_count}"));
    }

    fn on_page_discarded(&self, page_num: usize, _total_pages: usize) {
        self.push(format!("page_discarded {page_num}"));
    }

    fn on_normalize_complete(&self, total_pages: usize, committed_pages: usize) {
        self.push(format!("complete {total_pages} {committed_pages}"));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn text_page(page_number: u32, text: &str) -> ParsedPage {
    let bbox = RawPolygon::from_rect(72.0, 100.0, 540.0, 124.0);
    ParsedPage {
        page_number,
        width: 612.0,
        height: 792.0,
        blocks: vec![RawBlock {
            number: 0,
            kind: BlockKind::Text,
            bbox,
            lines: vec![RawBlockLine {
                bbox,
                spans: vec![RawSpan {
                    text: text.to_string(),
                    bbox,
                    font: Some("Helvetica".into()),
                    size: Some(10.0),
                    flags: Some(0),
                    color: Some(0),
                    chars: Vec::new(),
                }],
            }],
        }],
        image_count: 0,
    }
}

fn scanned_page(page_number: u32) -> ParsedPage {
    ParsedPage {
        page_number,
        width: 612.0,
        height: 792.0,
        blocks: vec![RawBlock {
            number: 0,
            kind: BlockKind::Image,
            bbox: RawPolygon::from_rect(0.0, 0.0, 612.0, 792.0),
            lines: Vec::new(),
        }],
        image_count: 1,
    }
}

fn region(content: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RawRegion {
    RawRegion {
        content: content.to_string(),
        polygon: RawPolygon::from_rect(x0, y0, x1, y1),
        confidence: Some(0.99),
    }
}

fn analysed_document() -> RawDocument {
    RawDocument {
        source: BackendKind::CloudAnalysis,
        pages: vec![RawPage {
            page_number: 1,
            width: 8.5,
            height: 11.0,
            unit: "inch".into(),
            layout: RawLayout::Regions {
                lines: vec![
                    region("Disconnect the unit from mains power.", 1.0, 1.0, 7.0, 1.3),
                    region("Wait ten minutes before opening.", 1.0, 1.4, 6.0, 1.7),
                ],
                words: vec![
                    region("Disconnect", 1.0, 1.0, 2.2, 1.3),
                    region("Warranty", 1.0, 9.0, 2.0, 9.3),
                ],
                paragraphs: vec![RawParagraph {
                    content: "Disconnect the unit from mains power. Wait ten minutes before opening.".into(),
                    polygon: RawPolygon::from_rect(0.9, 0.9, 7.1, 1.8),
                    role: None,
                    confidence: None,
                }],
            },
            tables: Vec::new(),
        }],
        key_value_pairs: vec![RawKeyValuePair {
            key: "Model".into(),
            value: Some("X-200".into()),
            key_region: Some((1, RawPolygon::from_rect(0.85, 0.55, 4.25, 0.66))),
            value_region: Some((1, RawPolygon::from_rect(4.25, 0.55, 6.8, 0.66))),
            confidence: Some(0.9),
        }],
    }
}

fn normalizer(
    config: NormalizerConfig,
    parsed: Result<Vec<ParsedPage>, BackendError>,
    cloud: Option<Arc<CountingCloud>>,
) -> Normalizer {
    let direct = DirectExtractor::new(Arc::new(FixedParser(parsed)), None);
    Normalizer::with_backends(config, direct, cloud.map(|c| c as Arc<dyn RawPageSource>))
}

// ── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn born_digital_document_never_calls_cloud() {
    let cloud = CountingCloud::new(Ok(analysed_document()));
    let n = normalizer(
        NormalizerConfig::default(),
        Ok(vec![text_page(1, STEP_TEXT)]),
        Some(Arc::clone(&cloud)),
    );

    let doc = n.normalize(PDF).await.expect("normalize");

    assert_eq!(cloud.calls(), 0, "cloud backend must not be called");
    assert_eq!(doc.summary.route, BackendKind::DirectExtraction);
    assert!(!doc.summary.probe_needs_ocr);
    assert!(!doc.summary.ocr_applied);
    assert_eq!(
        doc.summary.state_trace,
        vec![
            AssemblyState::Unloaded,
            AssemblyState::Probing,
            AssemblyState::DirectExtracting,
            AssemblyState::Preprocessing,
            AssemblyState::Ready,
        ]
    );
    assert_eq!(doc.paragraphs.len(), 1);
    assert_eq!(doc.sentences.len(), 2);
    assert!(matches!(doc.paragraphs[0].metadata, ParagraphMetadata::Extracted { .. }));
    assert!(doc.key_value_pairs.is_empty());
}

#[tokio::test]
async fn cloud_failure_falls_back_to_direct_without_error() {
    init_tracing();
    let cloud = CountingCloud::new(Err(BackendError::Status {
        status: 503,
        body: "Service Unavailable".into(),
    }));
    let n = normalizer(
        NormalizerConfig::default(),
        Ok(vec![text_page(1, STEP_TEXT), scanned_page(2)]),
        Some(Arc::clone(&cloud)),
    );

    let doc = n.normalize(PDF).await.expect("fallback must not be an error");

    assert_eq!(cloud.calls(), 1, "no retries");
    assert_eq!(doc.summary.route, BackendKind::DirectExtraction);
    assert!(doc.summary.probe_needs_ocr);
    assert_eq!(doc.summary.pages_needing_ocr, vec![2]);
    assert!(!doc.summary.ocr_applied);
    let reason = doc.summary.fallback_reason.as_deref().expect("fallback reason");
    assert!(reason.contains("503"), "got: {reason}");
    assert_eq!(
        &doc.summary.state_trace[1..4],
        &[
            AssemblyState::Probing,
            AssemblyState::CloudAnalyzing,
            AssemblyState::DirectExtracting,
        ]
    );
    assert_eq!(doc.pages.len(), 2);
    assert_eq!(doc.sentences.len(), 2);
}

#[tokio::test]
async fn missing_cloud_config_counts_as_cloud_failure() {
    let n = normalizer(NormalizerConfig::default(), Ok(vec![scanned_page(1)]), None);

    let doc = n.normalize(PDF).await.expect("normalize");

    assert_eq!(doc.summary.route, BackendKind::DirectExtraction);
    assert!(doc.summary.probe_needs_ocr);
    let reason = doc.summary.fallback_reason.as_deref().expect("fallback reason");
    assert!(reason.contains("not configured"), "got: {reason}");
    assert_eq!(doc.pages.len(), 1);
    assert!(doc.sentences.is_empty());
}

#[tokio::test]
async fn scanned_document_uses_cloud_structure() {
    let cloud = CountingCloud::new(Ok(analysed_document()));
    let n = normalizer(
        NormalizerConfig::default(),
        Ok(vec![scanned_page(1)]),
        Some(Arc::clone(&cloud)),
    );

    let doc = n.normalize(PDF).await.expect("normalize");

    assert_eq!(cloud.calls(), 1);
    assert_eq!(doc.summary.route, BackendKind::CloudAnalysis);
    assert!(doc.summary.ocr_applied);
    assert!(doc.summary.fallback_reason.is_none());

    assert_eq!(doc.lines.len(), 2);
    assert_eq!(doc.paragraphs.len(), 1);
    let para = &doc.paragraphs[0];
    assert!(matches!(para.metadata, ParagraphMetadata::Analyzed { .. }));
    assert_eq!(para.words.len(), 1, "only the word inside the paragraph box");
    assert_eq!(para.sentences.len(), 2);
    assert!(doc.sentences.iter().all(|s| s.paragraph_index == Some(0)));

    let kv = &doc.key_value_pairs[0];
    assert_eq!(kv.page_number, Some(1));
    assert_eq!(kv.key_bounding_box.map(|b| b.max_x()), Some(0.5));
}

#[tokio::test]
async fn unreadable_text_layer_with_cloud_success_is_not_fatal() {
    let cloud = CountingCloud::new(Ok(analysed_document()));
    let n = normalizer(
        NormalizerConfig::default(),
        Err(BackendError::Parse("xref table corrupt".into())),
        Some(Arc::clone(&cloud)),
    );

    let doc = n.normalize(PDF).await.expect("cloud structure");

    assert!(doc.summary.probe_failed);
    assert!(doc.summary.probe_needs_ocr);
    assert_eq!(doc.summary.route, BackendKind::CloudAnalysis);
}

#[tokio::test]
async fn no_backend_producing_structure_is_fatal() {
    let cloud = CountingCloud::new(Err(BackendError::Timeout { secs: 120 }));
    let n = normalizer(
        NormalizerConfig::default(),
        Err(BackendError::Parse("xref table corrupt".into())),
        Some(Arc::clone(&cloud)),
    );

    let err = n.normalize(PDF).await.unwrap_err();

    assert_eq!(cloud.calls(), 1);
    assert!(matches!(err, NormalizeError::ExtractionFailed { .. }), "got: {err:?}");
}

#[tokio::test]
async fn empty_cloud_result_falls_back() {
    let empty = RawDocument {
        source: BackendKind::CloudAnalysis,
        pages: Vec::new(),
        key_value_pairs: Vec::new(),
    };
    let cloud = CountingCloud::new(Ok(empty));
    let n = normalizer(
        NormalizerConfig::default(),
        Ok(vec![scanned_page(1)]),
        Some(Arc::clone(&cloud)),
    );

    let doc = n.normalize(PDF).await.expect("normalize");

    assert_eq!(doc.summary.route, BackendKind::DirectExtraction);
    assert!(doc.summary.fallback_reason.is_some());
}

// ── Assembly ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn paragraph_indices_are_document_wide() {
    let n = normalizer(
        NormalizerConfig::default(),
        Ok(vec![text_page(1, STEP_TEXT), text_page(2, STEP_TEXT)]),
        None,
    );

    let doc = n.normalize(PDF).await.expect("normalize");

    let indices: Vec<usize> = doc.paragraphs.iter().map(|p| p.paragraph_index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(doc.sentences_on(2).count(), 2);
    assert!(doc.sentences_on(2).all(|s| s.paragraph_index == Some(1)));
    assert_eq!(doc.page(2).map(|p| p.lines.len()), Some(1));
}

#[tokio::test]
async fn progress_events_arrive_in_page_order() {
    let recorder = Arc::new(Recorder::default());
    let config = NormalizerConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn NormalizeProgressCallback>)
        .build()
        .expect("config");
    let n = normalizer(config, Ok(vec![text_page(1, STEP_TEXT), text_page(2, STEP_TEXT)]), None);

    n.normalize(PDF).await.expect("normalize");

    assert_eq!(
        recorder.events(),
        vec![
            "start 2 direct-extraction",
            "page_start 1",
            "page_complete 1 2",
            "page_start 2",
            "page_complete 2 2",
            "complete 2 2",
        ]
    );
}

#[tokio::test]
async fn page_finished_after_cancel_is_discarded() {
    init_tracing();
    let flag = CancelFlag::new();
    let recorder = Arc::new(Recorder {
        flag: flag.clone(),
        cancel_on_start_of: Some(2),
        ..Recorder::default()
    });
    let config = NormalizerConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn NormalizeProgressCallback>)
        .cancel_flag(flag)
        .build()
        .expect("config");
    let n = normalizer(
        config,
        Ok(vec![text_page(1, STEP_TEXT), text_page(2, STEP_TEXT), text_page(3, STEP_TEXT)]),
        None,
    );

    let err = n.normalize(PDF).await.unwrap_err();

    assert!(matches!(err, NormalizeError::Cancelled { completed_pages: 1 }), "got: {err:?}");
    let events = recorder.events();
    assert!(events.contains(&"page_discarded 2".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("page_start 3")));
    assert!(!events.iter().any(|e| e.starts_with("complete")));
}

#[tokio::test]
async fn cancel_before_start_commits_nothing() {
    let flag = CancelFlag::new();
    flag.cancel();
    let config = NormalizerConfig::builder().cancel_flag(flag).build().expect("config");
    let n = normalizer(config, Ok(vec![text_page(1, STEP_TEXT)]), None);

    let err = n.normalize(PDF).await.unwrap_err();

    assert!(matches!(err, NormalizeError::Cancelled { completed_pages: 0 }));
}

#[tokio::test]
async fn document_serializes_with_top_level_collections() {
    let n = normalizer(NormalizerConfig::default(), Ok(vec![text_page(1, STEP_TEXT)]), None);
    let doc = n.normalize(PDF).await.expect("normalize");

    let json = serde_json::to_value(&doc).expect("serialize");
    for key in ["pages", "lines", "paragraphs", "sentences", "tables", "key_value_pairs", "summary"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["summary"]["route"], "direct_extraction");
    assert_eq!(json["paragraphs"][0]["metadata"]["source"], "extracted");
}

#[test]
fn callbacks_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Recorder>();
    assert_send_sync::<Normalizer>();
}
