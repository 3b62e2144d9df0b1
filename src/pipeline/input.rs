//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Both backends consume the document as an in-memory buffer (pdfium loads
//! from a byte slice, the cloud analyser takes the body of one POST), so a
//! downloaded PDF never touches the file system. We validate the PDF magic
//! bytes (`%PDF`) before returning so callers get a meaningful error rather
//! than a parser failure deep inside a backend.

use crate::error::NormalizeError;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

/// PDF bytes plus a human-readable name for logs and errors.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub source_name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, NormalizeError> {
    if input.trim().is_empty() {
        return Err(NormalizeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Read a local file, mapping missing-file and permission errors.
async fn read_local(path_str: &str) -> Result<ResolvedInput, NormalizeError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(NormalizeError::PermissionDenied { path });
        }
        Err(_) => return Err(NormalizeError::FileNotFound { path }),
    };

    let source_name = path.display().to_string();
    check_magic(&source_name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", source_name, bytes.len());
    Ok(ResolvedInput { source_name, bytes })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, NormalizeError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NormalizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            NormalizeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            NormalizeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(NormalizeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| NormalizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    check_magic(url, &bytes)?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(ResolvedInput {
        source_name: url.to_string(),
        bytes,
    })
}

/// Reject buffers that do not start with `%PDF`.
pub fn check_magic(source_name: &str, bytes: &[u8]) -> Result<(), NormalizeError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(NormalizeError::NotAPdf {
            source_name: source_name.to_string(),
            magic,
        });
    }
    Ok(())
}
