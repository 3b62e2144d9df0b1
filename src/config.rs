//! Configuration types for document structure normalization.
//!
//! All behaviour is controlled through [`NormalizerConfig`], built via its
//! [`NormalizerConfigBuilder`]. Every heuristic constant (fragment size,
//! overlap cut-offs, probe sparsity) lives in [`Thresholds`] so it can be
//! tuned per corpus instead of being baked into the stages.

use crate::error::NormalizeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Environment variable holding the cloud analyser endpoint.
pub const ENV_ENDPOINT: &str = "AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT";
/// Environment variable holding the cloud analyser subscription key.
pub const ENV_KEY: &str = "AZURE_DOCUMENT_INTELLIGENCE_KEY";
/// Optional environment override for the analysis model.
pub const ENV_MODEL: &str = "AZURE_DOCUMENT_INTELLIGENCE_MODEL";

/// Configuration for a normalization run.
///
/// # Example
/// ```rust
/// use edgequake_pdfstruct::NormalizerConfig;
///
/// let config = NormalizerConfig::builder()
///     .fragment_word_threshold(12)
///     .word_overlap_threshold(0.85)
///     .build()
///     .unwrap();
/// assert_eq!(config.thresholds.fragment_word_threshold, 12);
/// ```
#[derive(Clone)]
pub struct NormalizerConfig {
    /// Heuristic cut-offs used by the probe, merger, segmenter and associator.
    pub thresholds: Thresholds,

    /// Cloud analyser settings. `None` means every document goes through
    /// direct extraction, even when the probe asks for OCR.
    pub cloud: Option<CloudConfig>,

    /// PDF user password for encrypted documents (local parser only).
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation, checked between pages.
    pub cancel_flag: Option<CancelFlag>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            cloud: None,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel_flag: None,
        }
    }
}

impl fmt::Debug for NormalizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizerConfig")
            .field("thresholds", &self.thresholds)
            .field("cloud", &self.cloud)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn NormalizeProgressCallback>"),
            )
            .field("cancel_flag", &self.cancel_flag)
            .finish()
    }
}

impl NormalizerConfig {
    /// Create a new builder for `NormalizerConfig`.
    pub fn builder() -> NormalizerConfigBuilder {
        NormalizerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the caller has asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.as_ref().is_some_and(CancelFlag::is_raised)
    }
}

/// Tunable heuristics. Defaults are the reference values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// A text block with fewer words than this is merged into the next one.
    /// Default: 15.
    pub fragment_word_threshold: usize,

    /// Minimum share of a line's distinct words that must appear in a
    /// paragraph for the line to belong to it (strictly greater). Default: 0.9.
    pub word_overlap_threshold: f64,

    /// Minimum intersection-over-min-area between a line and a paragraph box
    /// (strictly greater). Default: 0.1.
    pub spatial_overlap_threshold: f64,

    /// Longest numeral still treated as a list marker (`12.`). Default: 2.
    pub list_marker_max_len: usize,

    /// Pages carrying images with fewer non-whitespace characters than this
    /// are treated as scans. Default: 100.
    pub min_chars_per_page: usize,

    /// A vertical gap larger than this many line heights starts a new block
    /// when the local parser groups lines. Default: 1.5.
    pub block_gap_factor: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fragment_word_threshold: 15,
            word_overlap_threshold: 0.9,
            spatial_overlap_threshold: 0.1,
            list_marker_max_len: 2,
            min_chars_per_page: 100,
            block_gap_factor: 1.5,
        }
    }
}

/// Connection settings for the cloud document-intelligence service.
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Resource endpoint, e.g. `https://my-resource.cognitiveservices.azure.com`.
    pub endpoint: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Analysis model. Default: `prebuilt-document`.
    pub model_id: String,
    /// REST API version. Default: `2023-07-31`.
    pub api_version: String,
    /// Deadline for the whole submit + poll cycle. Default: 120.
    pub timeout_secs: u64,
    /// Delay between status polls when the service sends no `Retry-After`.
    /// Default: 1000.
    pub poll_interval_ms: u64,
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl CloudConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: "prebuilt-document".to_string(),
            api_version: "2023-07-31".to_string(),
            timeout_secs: 120,
            poll_interval_ms: 1000,
        }
    }

    /// Read endpoint and key from the environment.
    ///
    /// Returns `None` unless both [`ENV_ENDPOINT`] and [`ENV_KEY`] are set and
    /// non-empty. [`ENV_MODEL`] overrides the model when present.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(ENV_ENDPOINT).ok().filter(|v| !v.is_empty())?;
        let key = std::env::var(ENV_KEY).ok().filter(|v| !v.is_empty())?;
        let mut cfg = Self::new(endpoint, key);
        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.is_empty() {
                cfg.model_id = model;
            }
        }
        Some(cfg)
    }
}

/// Shared flag the caller raises to stop a run between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder for [`NormalizerConfig`].
#[derive(Debug)]
pub struct NormalizerConfigBuilder {
    config: NormalizerConfig,
}

impl NormalizerConfigBuilder {
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn fragment_word_threshold(mut self, words: usize) -> Self {
        self.config.thresholds.fragment_word_threshold = words;
        self
    }

    pub fn word_overlap_threshold(mut self, ratio: f64) -> Self {
        self.config.thresholds.word_overlap_threshold = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn spatial_overlap_threshold(mut self, ratio: f64) -> Self {
        self.config.thresholds.spatial_overlap_threshold = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn list_marker_max_len(mut self, len: usize) -> Self {
        self.config.thresholds.list_marker_max_len = len.max(1);
        self
    }

    pub fn min_chars_per_page(mut self, chars: usize) -> Self {
        self.config.thresholds.min_chars_per_page = chars;
        self
    }

    pub fn block_gap_factor(mut self, factor: f32) -> Self {
        self.config.thresholds.block_gap_factor = factor.max(0.0);
        self
    }

    pub fn cloud(mut self, cloud: CloudConfig) -> Self {
        self.config.cloud = Some(cloud);
        self
    }

    /// Use [`CloudConfig::from_env`] when no cloud config was set explicitly.
    pub fn cloud_from_env(mut self) -> Self {
        if self.config.cloud.is_none() {
            self.config.cloud = CloudConfig::from_env();
        }
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel_flag = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NormalizerConfig, NormalizeError> {
        let c = &self.config;
        if let Some(cloud) = &c.cloud {
            if !(cloud.endpoint.starts_with("https://") || cloud.endpoint.starts_with("http://")) {
                return Err(NormalizeError::InvalidConfig(format!(
                    "Cloud endpoint must be an HTTP(S) URL, got '{}'",
                    cloud.endpoint
                )));
            }
            if cloud.api_key.is_empty() {
                return Err(NormalizeError::InvalidConfig(
                    "Cloud API key must not be empty".into(),
                ));
            }
            if cloud.timeout_secs == 0 {
                return Err(NormalizeError::InvalidConfig(
                    "Cloud timeout must be ≥ 1s".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
