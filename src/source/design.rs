//! Design-reference sources.
//!
//! A [`DesignSource`] resolves an opaque design reference (file key + node
//! id) to raw raster bytes. Three implementations ship with the crate:
//! - [`FileDesignSource`] for design exports checked into CI
//! - [`InMemoryDesignSource`] for tests and embedding
//! - [`HttpDesignSource`] for a Figma-style image export API

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

/// Opaque reference to a region in the design-authoring tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
pub struct DesignRef {
    /// Identifier of the design file
    pub file_key: String,
    /// Identifier of the node (frame/component) within the file
    pub node_id: String,
}

impl DesignRef {
    pub fn new(file_key: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            file_key: file_key.into(),
            node_id: node_id.into(),
        }
    }
}

impl std::fmt::Display for DesignRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file_key, self.node_id)
    }
}

/// Failure category for a design fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCode {
    /// Network-level failure reaching the design source
    Network,
    /// The design source rejected the credentials
    Auth,
    /// The file or node does not exist
    NotFound,
    /// The fetch exceeded its timeout
    Timeout,
}

/// Error fetching a design reference
#[derive(Debug, Clone)]
pub struct DesignFetchError {
    pub code: FetchErrorCode,
    pub message: String,
}

impl DesignFetchError {
    pub fn new(code: FetchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DesignFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Design fetch error ({:?}): {}", self.code, self.message)
    }
}

impl std::error::Error for DesignFetchError {}

/// Source of authoritative design rasters
pub trait DesignSource: Send {
    /// Fetch the raster bytes for a design reference
    fn fetch_region(
        &mut self,
        design_ref: &DesignRef,
        timeout_ms: u64,
    ) -> Result<Vec<u8>, DesignFetchError>;

    /// Get the source type identifier (e.g., "file", "memory", "http")
    fn source_type(&self) -> &str;
}

/// Design source backed by exported assets on disk.
///
/// References resolve to `<root>/<file_key>/<node_id>.png`.
#[derive(Debug, Clone)]
pub struct FileDesignSource {
    root: PathBuf,
}

impl FileDesignSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, design_ref: &DesignRef) -> PathBuf {
        self.root
            .join(&design_ref.file_key)
            .join(format!("{}.png", design_ref.node_id))
    }
}

impl DesignSource for FileDesignSource {
    fn fetch_region(
        &mut self,
        design_ref: &DesignRef,
        _timeout_ms: u64,
    ) -> Result<Vec<u8>, DesignFetchError> {
        let path = self.path_for(design_ref);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DesignFetchError::new(
                FetchErrorCode::NotFound,
                format!("no design export at {}", path.display()),
            ),
            _ => DesignFetchError::new(
                FetchErrorCode::Network,
                format!("failed to read {}: {}", path.display(), e),
            ),
        })
    }

    fn source_type(&self) -> &str {
        "file"
    }
}

/// Map-backed design source for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct InMemoryDesignSource {
    regions: HashMap<DesignRef, Vec<u8>>,
}

impl InMemoryDesignSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register raster bytes for a design reference
    pub fn insert(&mut self, design_ref: DesignRef, bytes: Vec<u8>) {
        self.regions.insert(design_ref, bytes);
    }

    pub fn with_region(mut self, design_ref: DesignRef, bytes: Vec<u8>) -> Self {
        self.insert(design_ref, bytes);
        self
    }
}

impl DesignSource for InMemoryDesignSource {
    fn fetch_region(
        &mut self,
        design_ref: &DesignRef,
        _timeout_ms: u64,
    ) -> Result<Vec<u8>, DesignFetchError> {
        self.regions.get(design_ref).cloned().ok_or_else(|| {
            DesignFetchError::new(
                FetchErrorCode::NotFound,
                format!("no registered design region for {}", design_ref),
            )
        })
    }

    fn source_type(&self) -> &str {
        "memory"
    }
}

/// Design source speaking a Figma-style image export API.
///
/// Fetching is a two-step exchange: `GET {base}/v1/images/{file_key}?ids=
/// {node_id}` returns JSON mapping node ids to short-lived image URLs, then
/// the image URL is fetched for the raster bytes. Both requests go through
/// curl with an explicit `--max-time`.
#[derive(Debug, Clone)]
pub struct HttpDesignSource {
    base_url: String,
    token: String,
}

/// Response shape of the image export endpoint
#[derive(Debug, Deserialize)]
struct ImageExportResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

impl HttpDesignSource {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn export_url(&self, design_ref: &DesignRef) -> String {
        format!(
            "{}/v1/images/{}?ids={}&format=png",
            self.base_url, design_ref.file_key, design_ref.node_id
        )
    }
}

impl DesignSource for HttpDesignSource {
    fn fetch_region(
        &mut self,
        design_ref: &DesignRef,
        timeout_ms: u64,
    ) -> Result<Vec<u8>, DesignFetchError> {
        let auth_header = format!("X-Figma-Token: {}", self.token);
        let (status, body) = curl_get(&self.export_url(design_ref), Some(&auth_header), timeout_ms)?;

        match status {
            200 => {}
            401 | 403 => {
                return Err(DesignFetchError::new(
                    FetchErrorCode::Auth,
                    format!("design source rejected token (HTTP {})", status),
                ));
            }
            404 => {
                return Err(DesignFetchError::new(
                    FetchErrorCode::NotFound,
                    format!("design file {} not found", design_ref.file_key),
                ));
            }
            other => {
                return Err(DesignFetchError::new(
                    FetchErrorCode::Network,
                    format!("image export returned HTTP {}", other),
                ));
            }
        }

        let response: ImageExportResponse = serde_json::from_slice(&body).map_err(|e| {
            DesignFetchError::new(
                FetchErrorCode::Network,
                format!("invalid image export response: {}", e),
            )
        })?;

        if let Some(err) = response.err {
            return Err(DesignFetchError::new(FetchErrorCode::Network, err));
        }

        let image_url = response
            .images
            .get(&design_ref.node_id)
            .and_then(|u| u.clone())
            .ok_or_else(|| {
                DesignFetchError::new(
                    FetchErrorCode::NotFound,
                    format!("node {} missing from export response", design_ref.node_id),
                )
            })?;

        let (status, bytes) = curl_get(&image_url, None, timeout_ms)?;
        if status != 200 {
            return Err(DesignFetchError::new(
                FetchErrorCode::Network,
                format!("image download returned HTTP {}", status),
            ));
        }
        Ok(bytes)
    }

    fn source_type(&self) -> &str {
        "http"
    }
}

/// curl exit code for an exceeded --max-time
const CURL_EXIT_TIMEOUT: i32 = 28;

/// GET a URL via curl, returning the HTTP status and response body.
///
/// The body lands in a scratch file so binary payloads never pass through
/// stdout; stdout carries only the status code.
fn curl_get(
    url: &str,
    header: Option<&str>,
    timeout_ms: u64,
) -> Result<(u16, Vec<u8>), DesignFetchError> {
    let scratch = std::env::temp_dir().join(format!(
        "design_fidelity_fetch_{}_{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let timeout_secs = (timeout_ms.div_ceil(1000)).max(1);

    let mut cmd = Command::new("curl");
    cmd.args([
        "-s",
        "-o",
        &scratch.to_string_lossy(),
        "-w",
        "%{http_code}",
        "--max-time",
        &timeout_secs.to_string(),
    ]);
    if let Some(header) = header {
        cmd.args(["-H", header]);
    }
    cmd.arg(url);

    let output = cmd.output().map_err(|e| {
        DesignFetchError::new(FetchErrorCode::Network, format!("failed to run curl: {}", e))
    })?;

    let body = std::fs::read(&scratch).unwrap_or_default();
    let _ = std::fs::remove_file(&scratch);

    if !output.status.success() {
        if output.status.code() == Some(CURL_EXIT_TIMEOUT) {
            return Err(DesignFetchError::new(
                FetchErrorCode::Timeout,
                format!("fetch of {} exceeded {}ms", url, timeout_ms),
            ));
        }
        return Err(DesignFetchError::new(
            FetchErrorCode::Network,
            format!(
                "curl failed for {}: {}",
                url,
                String::from_utf8_lossy(&output.stderr)
            ),
        ));
    }

    let status: u16 = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .unwrap_or(0);
    if status == 0 {
        return Err(DesignFetchError::new(
            FetchErrorCode::Network,
            format!("no HTTP response from {}", url),
        ));
    }
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterImage;

    #[test]
    fn test_in_memory_source_fetch() {
        let png = RasterImage::with_color(4, 4, [1, 2, 3, 255]).to_png().unwrap();
        let design_ref = DesignRef::new("file-a", "1:2");
        let mut source = InMemoryDesignSource::new().with_region(design_ref.clone(), png.clone());

        assert_eq!(source.fetch_region(&design_ref, 1000).unwrap(), png);
        assert_eq!(source.source_type(), "memory");
    }

    #[test]
    fn test_in_memory_source_not_found() {
        let mut source = InMemoryDesignSource::new();
        let err = source
            .fetch_region(&DesignRef::new("missing", "0:0"), 1000)
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::NotFound);
    }

    #[test]
    fn test_file_source_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file_dir = dir.path().join("homepage");
        std::fs::create_dir_all(&file_dir).unwrap();
        let png = RasterImage::with_color(8, 8, [9, 9, 9, 255]).to_png().unwrap();
        std::fs::write(file_dir.join("hero.png"), &png).unwrap();

        let mut source = FileDesignSource::new(dir.path());
        let bytes = source
            .fetch_region(&DesignRef::new("homepage", "hero"), 1000)
            .unwrap();
        assert_eq!(bytes, png);
    }

    #[test]
    fn test_file_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileDesignSource::new(dir.path());
        let err = source
            .fetch_region(&DesignRef::new("homepage", "missing"), 1000)
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::NotFound);
    }

    #[test]
    fn test_http_source_export_url() {
        let source = HttpDesignSource::new("https://api.example.com/", "tok");
        assert_eq!(
            source.export_url(&DesignRef::new("abc", "1:2")),
            "https://api.example.com/v1/images/abc?ids=1:2&format=png"
        );
    }
}
