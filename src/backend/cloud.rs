//! Cloud analysis through the Azure Document Intelligence REST API.
//!
//! One document costs one long-running operation:
//!
//! ```text
//! POST {endpoint}/formrecognizer/documentModels/{model}:analyze?api-version=…
//!   ── 202 Accepted, Operation-Location: <poll url>
//! GET  <poll url>   (repeat, honouring Retry-After)
//!   ── {"status": "running"} … {"status": "succeeded", "analyzeResult": {…}}
//! ```
//!
//! The whole submit + poll cycle runs under a single deadline. There is no
//! retry here: any failure goes back to the assembler, which falls back to
//! direct extraction.
//!
//! The service reports lines and words per page, but paragraphs, tables and
//! key/value pairs at document level with `boundingRegions` pointing at a
//! page. [`into_raw`] files each of them under the page of its first region.

use crate::backend::RawPageSource;
use crate::config::CloudConfig;
use crate::error::BackendError;
use crate::geometry::RawPolygon;
use crate::raw::{
    BackendKind, RawCell, RawDocument, RawKeyValuePair, RawLayout, RawPage, RawParagraph,
    RawRegion, RawTable,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Wire format ──────────────────────────────────────────────────────────
//
// Element lists are read one element at a time: an element the types below
// cannot hold is logged and skipped, and the rest of the result survives.

fn skip_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(element) => Some(element),
            Err(e) => {
                debug!("Skipping malformed {}: {}", element_name::<T>(), e);
                None
            }
        })
        .collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn element_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOperation {
    pub status: String,
    #[serde(default)]
    pub analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    #[serde(default, deserialize_with = "skip_malformed")]
    pub pages: Vec<AnalyzedPage>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub paragraphs: Vec<AnalyzedParagraph>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub tables: Vec<AnalyzedTable>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub key_value_pairs: Vec<AnalyzedKeyValuePair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedPage {
    pub page_number: u32,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub lines: Vec<AnalyzedText>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub words: Vec<AnalyzedText>,
}

/// A line or a word.
#[derive(Debug, Deserialize)]
pub struct AnalyzedText {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub polygon: Vec<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    pub page_number: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub polygon: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedParagraph {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub bounding_regions: Vec<BoundingRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedTable {
    pub row_count: u32,
    pub column_count: u32,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub cells: Vec<AnalyzedCell>,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub bounding_regions: Vec<BoundingRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedCell {
    #[serde(default)]
    pub kind: Option<String>,
    pub row_index: u32,
    pub column_index: u32,
    #[serde(default)]
    pub row_span: Option<u32>,
    #[serde(default)]
    pub column_span: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub bounding_regions: Vec<BoundingRegion>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedKeyValuePair {
    pub key: AnalyzedElement,
    #[serde(default)]
    pub value: Option<AnalyzedElement>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedElement {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub bounding_regions: Vec<BoundingRegion>,
}

// ── Client ───────────────────────────────────────────────────────────────

/// [`RawPageSource`] that sends the document to Azure Document Intelligence.
#[derive(Debug, Clone)]
pub struct DocumentIntelligenceClient {
    http: reqwest::Client,
    config: CloudConfig,
}

impl DocumentIntelligenceClient {
    pub fn new(config: CloudConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model_id,
            self.config.api_version
        )
    }

    async fn submit(&self, bytes: &[u8]) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| BackendError::Malformed("analyze response lacks Operation-Location".into()))
    }

    async fn poll(&self, operation_url: &str) -> Result<AnalyzeResult, BackendError> {
        let default_delay = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let response = self
                .http
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
                .send()
                .await
                .map_err(|e| BackendError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let delay = retry_after(response.headers()).unwrap_or(default_delay);
            let operation: AnalyzeOperation = response
                .json()
                .await
                .map_err(|e| BackendError::Malformed(e.to_string()))?;

            match operation.status.as_str() {
                "succeeded" => {
                    return operation
                        .analyze_result
                        .ok_or_else(|| BackendError::Malformed("succeeded without analyzeResult".into()));
                }
                "failed" => {
                    let detail = operation
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "no error detail".to_string());
                    return Err(BackendError::AnalysisFailed(detail));
                }
                other => {
                    debug!("Analyze operation {}; polling again in {:?}", other, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl RawPageSource for DocumentIntelligenceClient {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudAnalysis
    }

    async fn analyze(&self, bytes: &[u8]) -> Result<RawDocument, BackendError> {
        let secs = self.config.timeout_secs;
        info!(
            "Submitting {} bytes to cloud analysis (model {})",
            bytes.len(),
            self.config.model_id
        );

        let cycle = async {
            let operation_url = self.submit(bytes).await?;
            self.poll(&operation_url).await
        };
        let result = tokio::time::timeout(Duration::from_secs(secs), cycle)
            .await
            .map_err(|_| BackendError::Timeout { secs })??;

        Ok(into_raw(result))
    }
}

// ── Mapping ──────────────────────────────────────────────────────────────

/// Map an analyze result into the common raw shape.
///
/// Elements with a polygon that is not eight finite numbers are dropped;
/// pages without a width or height are dropped with everything on them.
pub fn into_raw(result: AnalyzeResult) -> RawDocument {
    let mut paragraphs: HashMap<u32, Vec<RawParagraph>> = HashMap::new();
    for paragraph in result.paragraphs {
        let Some((page, polygon)) = first_region(&paragraph.bounding_regions) else {
            debug!("Skipping paragraph without a usable bounding region");
            continue;
        };
        paragraphs.entry(page).or_default().push(RawParagraph {
            content: paragraph.content,
            polygon,
            role: paragraph.role,
            confidence: None,
        });
    }

    let mut tables: HashMap<u32, Vec<RawTable>> = HashMap::new();
    for table in result.tables {
        let Some(page) = table.bounding_regions.first().map(|r| r.page_number) else {
            debug!("Skipping table without a bounding region");
            continue;
        };
        let cells = table
            .cells
            .into_iter()
            .map(|cell| RawCell {
                polygon: region_on_page(&cell.bounding_regions, page),
                content: cell.content,
                kind: cell.kind,
                row_index: cell.row_index,
                column_index: cell.column_index,
                row_span: cell.row_span.unwrap_or(1),
                column_span: cell.column_span.unwrap_or(1),
                confidence: cell.confidence,
            })
            .collect();
        tables.entry(page).or_default().push(RawTable {
            row_count: table.row_count,
            column_count: table.column_count,
            polygon: region_on_page(&table.bounding_regions, page),
            cells,
        });
    }

    let mut pages = Vec::with_capacity(result.pages.len());
    for page in result.pages {
        let (Some(width), Some(height)) = (page.width, page.height) else {
            warn!("Skipping cloud page {} without dimensions", page.page_number);
            continue;
        };
        if width <= 0.0 || height <= 0.0 {
            warn!("Skipping cloud page {} with size {}x{}", page.page_number, width, height);
            continue;
        }

        pages.push(RawPage {
            page_number: page.page_number,
            width,
            height,
            unit: page.unit.unwrap_or_else(|| "inch".to_string()),
            layout: RawLayout::Regions {
                lines: regions(page.lines),
                words: regions(page.words),
                paragraphs: paragraphs.remove(&page.page_number).unwrap_or_default(),
            },
            tables: tables.remove(&page.page_number).unwrap_or_default(),
        });
    }

    let key_value_pairs = result
        .key_value_pairs
        .into_iter()
        .map(|kv| RawKeyValuePair {
            key_region: first_region(&kv.key.bounding_regions),
            value_region: kv.value.as_ref().and_then(|v| first_region(&v.bounding_regions)),
            key: kv.key.content,
            value: kv.value.map(|v| v.content),
            confidence: kv.confidence,
        })
        .collect();

    RawDocument {
        source: BackendKind::CloudAnalysis,
        pages,
        key_value_pairs,
    }
}

fn regions(items: Vec<AnalyzedText>) -> Vec<RawRegion> {
    items
        .into_iter()
        .filter_map(|item| {
            let polygon = RawPolygon::from_flat(&item.polygon)?;
            Some(RawRegion {
                content: item.content,
                polygon,
                confidence: item.confidence,
            })
        })
        .collect()
}

fn first_region(regions: &[BoundingRegion]) -> Option<(u32, RawPolygon)> {
    let region = regions.first()?;
    Some((region.page_number, RawPolygon::from_flat(&region.polygon)?))
}

fn region_on_page(regions: &[BoundingRegion], page: u32) -> Option<RawPolygon> {
    regions
        .iter()
        .find(|r| r.page_number == page)
        .and_then(|r| RawPolygon::from_flat(&r.polygon))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
      "status": "succeeded",
      "analyzeResult": {
        "pages": [
          {
            "pageNumber": 1, "width": 8.5, "height": 11, "unit": "inch",
            "lines": [
              {"content": "1. Turn off power.", "polygon": [1,1, 4,1, 4,1.2, 1,1.2]},
              {"content": "broken", "polygon": [1,2, 3]}
            ],
            "words": [
              {"content": "Turn", "polygon": [1.3,1, 1.7,1, 1.7,1.2, 1.3,1.2], "confidence": 0.99}
            ]
          },
          {"pageNumber": 2, "unit": "inch", "lines": []},
          {"pageNumber": 3, "width": 8.5, "height": 11, "unit": "inch"}
        ],
        "paragraphs": [
          {"content": "1. Turn off power.", "role": "sectionHeading",
           "boundingRegions": [{"pageNumber": 1, "polygon": [1,1, 4,1, 4,1.2, 1,1.2]}]},
          {"content": "Footer", "boundingRegions": [{"pageNumber": 3, "polygon": [1,10, 2,10, 2,10.2, 1,10.2]}]},
          {"content": "orphan", "boundingRegions": []}
        ],
        "tables": [
          {"rowCount": 1, "columnCount": 2,
           "boundingRegions": [{"pageNumber": 1, "polygon": [1,3, 5,3, 5,4, 1,4]}],
           "cells": [
             {"kind": "columnHeader", "rowIndex": 0, "columnIndex": 0, "content": "Bolt",
              "boundingRegions": [{"pageNumber": 1, "polygon": [1,3, 3,3, 3,4, 1,4]}]},
             {"rowIndex": 0, "columnIndex": 1, "columnSpan": 1, "content": "12 Nm", "boundingRegions": []}
           ]}
        ],
        "keyValuePairs": [
          {"key": {"content": "Model", "boundingRegions": [{"pageNumber": 1, "polygon": [1,5, 2,5, 2,5.2, 1,5.2]}]},
           "value": {"content": "X-200", "boundingRegions": [{"pageNumber": 1, "polygon": [2.1,5, 3,5, 3,5.2, 2.1,5.2]}]},
           "confidence": 0.87},
          {"key": {"content": "Serial"}, "confidence": 0.4}
        ]
      }
    }"#;

    fn fixture() -> RawDocument {
        let op: AnalyzeOperation = serde_json::from_str(FIXTURE).expect("fixture parses");
        assert_eq!(op.status, "succeeded");
        into_raw(op.analyze_result.expect("result present"))
    }

    #[test]
    fn pages_without_dimensions_are_skipped() {
        let doc = fixture();
        let numbers: Vec<_> = doc.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(doc.source, BackendKind::CloudAnalysis);
    }

    #[test]
    fn malformed_polygons_are_dropped() {
        let doc = fixture();
        let RawLayout::Regions { lines, words, .. } = &doc.pages[0].layout else {
            panic!("cloud pages carry regions");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].content, "1. Turn off power.");
        assert_eq!(words[0].confidence, Some(0.99));
    }

    #[test]
    fn paragraphs_are_filed_under_their_page() {
        let doc = fixture();
        let RawLayout::Regions { paragraphs, .. } = &doc.pages[0].layout else {
            panic!("cloud pages carry regions");
        };
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].role.as_deref(), Some("sectionHeading"));

        let RawLayout::Regions { paragraphs, .. } = &doc.pages[1].layout else {
            panic!("cloud pages carry regions");
        };
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].content, "Footer");
    }

    #[test]
    fn tables_keep_indices_and_default_spans() {
        let doc = fixture();
        let table = &doc.pages[0].tables[0];
        assert_eq!((table.row_count, table.column_count), (1, 2));
        assert!(table.polygon.is_some());
        assert_eq!(table.cells[0].kind.as_deref(), Some("columnHeader"));
        assert_eq!(table.cells[0].row_span, 1);
        assert!(table.cells[0].polygon.is_some());
        assert!(table.cells[1].polygon.is_none());
        assert_eq!(table.cells[1].column_index, 1);
    }

    #[test]
    fn key_value_pairs_keep_regions_when_present() {
        let doc = fixture();
        assert_eq!(doc.key_value_pairs.len(), 2);
        let model = &doc.key_value_pairs[0];
        assert_eq!(model.value.as_deref(), Some("X-200"));
        assert_eq!(model.key_region.map(|(page, _)| page), Some(1));
        let serial = &doc.key_value_pairs[1];
        assert!(serial.value.is_none());
        assert!(serial.key_region.is_none());
    }

    #[test]
    fn malformed_elements_are_skipped_not_fatal() {
        let op: AnalyzeOperation = serde_json::from_str(
            r#"{
              "status": "succeeded",
              "analyzeResult": {
                "pages": [
                  {"pageNumber": 1, "width": 8.5, "height": 11,
                   "lines": [
                     {"content": "Keep dry.", "polygon": [1,1, 3,1, 3,1.2, 1,1.2]},
                     {"content": null, "polygon": [1,2, 3,2, 3,2.2, 1,2.2]},
                     {"content": "Bad box", "polygon": null},
                     "not an object"
                   ]},
                  {"width": 8.5, "height": 11}
                ],
                "paragraphs": [
                  {"content": "Keep dry.", "boundingRegions": [{"polygon": [1,1, 3,1, 3,1.2, 1,1.2]}]}
                ],
                "tables": [
                  {"rowCount": 1, "columnCount": 2,
                   "boundingRegions": [{"pageNumber": 1, "polygon": [1,3, 5,3, 5,4, 1,4]}],
                   "cells": [
                     {"columnIndex": 0, "content": "no row"},
                     {"rowIndex": 0, "columnIndex": 1, "content": "12 Nm"}
                   ]},
                  {"columnCount": 3}
                ],
                "keyValuePairs": [
                  {"value": {"content": "orphan value"}},
                  {"key": {"content": "Model"}, "value": null}
                ]
              }
            }"#,
        )
        .expect("one bad element does not spoil the result");
        let doc = into_raw(op.analyze_result.expect("result present"));

        assert_eq!(doc.pages.len(), 1);
        let RawLayout::Regions { lines, paragraphs, .. } = &doc.pages[0].layout else {
            panic!("cloud pages carry regions");
        };
        let contents: Vec<_> = lines.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["Keep dry.", ""]);
        assert!(paragraphs.is_empty());

        assert_eq!(doc.pages[0].tables.len(), 1);
        let cells = &doc.pages[0].tables[0].cells;
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].content, "12 Nm");

        assert_eq!(doc.key_value_pairs.len(), 1);
        assert_eq!(doc.key_value_pairs[0].key, "Model");
        assert!(doc.key_value_pairs[0].value.is_none());
    }

    #[test]
    fn failed_operation_parses_error_detail() {
        let op: AnalyzeOperation = serde_json::from_str(
            r#"{"status":"failed","error":{"code":"InvalidContent","message":"corrupt"}}"#,
        )
        .expect("parses");
        assert_eq!(op.status, "failed");
        assert_eq!(op.error.map(|e| e.code).as_deref(), Some("InvalidContent"));
    }

    #[test]
    fn analyze_url_includes_model_and_version() {
        let client = DocumentIntelligenceClient::new(CloudConfig::new(
            "https://res.cognitiveservices.azure.com/",
            "key",
        ))
        .expect("client");
        assert_eq!(
            client.analyze_url(),
            "https://res.cognitiveservices.azure.com/formrecognizer/documentModels/prebuilt-document:analyze?api-version=2023-07-31"
        );
    }

    #[test]
    fn retry_after_reads_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "2".parse().expect("header value"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        assert_eq!(retry_after(&reqwest::header::HeaderMap::new()), None);
    }
}
