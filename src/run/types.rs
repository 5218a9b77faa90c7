//! Core types for fidelity runs: regions, the per-section state machine,
//! and the serializable run record consumed by report tooling.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::diff::{DiffError, DiffResult};
use crate::gate::Classification;
use crate::normalize::Bounds;
use crate::raster::RasterImage;
use crate::source::{CaptureError, DesignFetchError};

/// A named rectangular area of the page selected for comparison.
///
/// Regions are supplied once per run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Region name, unique within a run (e.g., "hero", "pricing-table")
    pub name: String,

    /// Page-coordinate bounds of the region
    pub bounds: Bounds,

    /// CSS selector for element capture; viewport clipping is the fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl Region {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            bounds,
            selector: None,
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// One unit of comparison work: a page region paired with the design
/// reference it is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    #[serde(flatten)]
    pub region: Region,

    /// Design reference for this region
    pub design: crate::source::DesignRef,
}

impl SectionSpec {
    pub fn new(region: Region, design: crate::source::DesignRef) -> Self {
        Self { region, design }
    }
}

/// Phase of the per-section pipeline.
///
/// `Classified` and `Failed` are terminal; `Failed` is reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    FetchingDesign,
    CapturingImpl,
    Normalizing,
    Diffing,
    Classified,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Classified | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Pending => "PENDING",
            Phase::FetchingDesign => "FETCHING_DESIGN",
            Phase::CapturingImpl => "CAPTURING_IMPL",
            Phase::Normalizing => "NORMALIZING",
            Phase::Diffing => "DIFFING",
            Phase::Classified => "CLASSIFIED",
            Phase::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Error that failed a single section.
///
/// These are caught at the section boundary and recorded; they never abort
/// the rest of the run.
#[derive(Debug, Clone)]
pub enum SectionError {
    /// Design source failure (network, auth, missing node)
    DesignFetch(DesignFetchError),

    /// Implementation capture failure (selector chain exhausted, navigation)
    Capture(CaptureError),

    /// Region bounds clamped to nothing during crop
    Config(ConfigError),

    /// Corrupt image data or mismatched dimensions at the diff stage
    Diff(DiffError),

    /// The run was cancelled before this section completed
    Cancelled,
}

// Serialized as a single-entry map of variant name to message, so the run
// record stays a plain JSON document.
impl Serialize for SectionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let (variant, message) = match self {
            SectionError::DesignFetch(e) => ("design_fetch", e.to_string()),
            SectionError::Capture(e) => ("capture", e.to_string()),
            SectionError::Config(e) => ("config", e.to_string()),
            SectionError::Diff(e) => ("diff", e.to_string()),
            SectionError::Cancelled => ("cancelled", "run cancelled".to_string()),
        };
        let mut map = serializer.serialize_map(Some(1))?;
        SerializeMap::serialize_entry(&mut map, variant, &message)?;
        SerializeMap::end(map)
    }
}

impl std::fmt::Display for SectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionError::DesignFetch(e) => write!(f, "{}", e),
            SectionError::Capture(e) => write!(f, "{}", e),
            SectionError::Config(e) => write!(f, "{}", e),
            SectionError::Diff(e) => write!(f, "{}", e),
            SectionError::Cancelled => write!(f, "Run cancelled"),
        }
    }
}

impl std::error::Error for SectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SectionError::DesignFetch(e) => Some(e),
            SectionError::Capture(e) => Some(e),
            SectionError::Config(e) => Some(e),
            SectionError::Diff(e) => Some(e),
            SectionError::Cancelled => None,
        }
    }
}

impl From<DesignFetchError> for SectionError {
    fn from(err: DesignFetchError) -> Self {
        SectionError::DesignFetch(err)
    }
}

impl From<CaptureError> for SectionError {
    fn from(err: CaptureError) -> Self {
        SectionError::Capture(err)
    }
}

impl From<ConfigError> for SectionError {
    fn from(err: ConfigError) -> Self {
        SectionError::Config(err)
    }
}

impl From<DiffError> for SectionError {
    fn from(err: DiffError) -> Self {
        SectionError::Diff(err)
    }
}

/// Result of one region's comparison.
///
/// Invariant: a section either completed (`diff` and `classification`
/// present, `phase == Classified`) or failed (`error` present,
/// `phase == Failed`), never both. The constructors are the only way run
/// code builds one.
#[derive(Debug, Clone, Serialize)]
pub struct SectionResult {
    /// The region as configured
    pub region: Region,

    /// Terminal phase reached
    pub phase: Phase,

    /// Phase the section was in when it failed (Failed sections only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,

    /// Diff metrics (completed sections only)
    #[serde(flatten)]
    pub diff: Option<DiffResult>,

    /// Quality classification (completed sections only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,

    /// Error that failed the section (failed sections only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SectionError>,

    /// Whether the design and implementation captures needed padding onto a
    /// common canvas before diffing
    pub size_mismatch: bool,

    /// Normalized design raster, for downstream artifact persistence
    #[serde(skip)]
    pub design_image: Option<RasterImage>,

    /// Normalized implementation raster
    #[serde(skip)]
    pub impl_image: Option<RasterImage>,
}

impl SectionResult {
    /// Build a completed section
    pub fn classified(
        region: Region,
        diff: DiffResult,
        classification: Classification,
        size_mismatch: bool,
        design_image: RasterImage,
        impl_image: RasterImage,
    ) -> Self {
        Self {
            region,
            phase: Phase::Classified,
            failed_phase: None,
            diff: Some(diff),
            classification: Some(classification),
            error: None,
            size_mismatch,
            design_image: Some(design_image),
            impl_image: Some(impl_image),
        }
    }

    /// Build a failed section, recording the phase the error occurred in
    pub fn failed(region: Region, failed_phase: Phase, error: SectionError) -> Self {
        Self {
            region,
            phase: Phase::Failed,
            failed_phase: Some(failed_phase),
            diff: None,
            classification: None,
            error: Some(error),
            size_mismatch: false,
            design_image: None,
            impl_image: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }
}

/// Result of a complete fidelity run.
///
/// Always contains one section per input region, in input order, regardless
/// of completion order or partial failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// When the run finished
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,

    /// Per-region results, in input region order
    pub sections: Vec<SectionResult>,

    /// Worst classification across sections; errored sections count as FAIL
    pub overall_status: Classification,
}

/// Fatal error aborting a run before (or instead of) producing a result
#[derive(Debug)]
pub enum RunError {
    /// Invalid configuration or region list; nothing was captured
    Config(ConfigError),

    /// A required runtime capability is unavailable; every section would
    /// fail identically
    System(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{}", e),
            RunError::System(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::System(_) => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;

    fn sample_region() -> Region {
        Region::new("hero", Bounds::new(0, 0, 10, 10))
    }

    #[test]
    fn test_phase_terminality() {
        assert!(Phase::Classified.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Pending.is_terminal());
        assert!(!Phase::Diffing.is_terminal());
    }

    #[test]
    fn test_section_result_exclusivity() {
        let img = RasterImage::with_color(10, 10, [0, 0, 0, 255]);
        let result = diff::diff(&img, &img, 0.1).unwrap();
        let ok = SectionResult::classified(
            sample_region(),
            result,
            Classification::Pass,
            false,
            img.clone(),
            img.clone(),
        );
        assert!(ok.classification.is_some() && ok.error.is_none());
        assert_eq!(ok.phase, Phase::Classified);

        let failed = SectionResult::failed(
            sample_region(),
            Phase::FetchingDesign,
            SectionError::Cancelled,
        );
        assert!(failed.classification.is_none() && failed.error.is_some());
        assert!(failed.diff.is_none());
        assert_eq!(failed.failed_phase, Some(Phase::FetchingDesign));
    }

    #[test]
    fn test_section_error_serializes_as_map() {
        let err = SectionError::Capture(CaptureError::SelectorNotFound("#nav".to_string()));
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("capture").is_some());
    }

    #[test]
    fn test_run_result_record_shape() {
        let failed = SectionResult::failed(
            sample_region(),
            Phase::CapturingImpl,
            SectionError::Cancelled,
        );
        let run = RunResult {
            timestamp: Utc::now(),
            sections: vec![failed],
            overall_status: Classification::Fail,
        };
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["overall_status"], "FAIL");
        assert_eq!(json["sections"][0]["region"]["name"], "hero");
        assert_eq!(json["sections"][0]["phase"], "FAILED");
        assert!(json["sections"][0]["error"].is_object());
        // Completed-only fields are absent on a failed section
        assert!(json["sections"][0].get("classification").is_none());
    }

    #[test]
    fn test_region_deserializes_from_manifest_json() {
        let manifest = r##"{
            "name": "pricing",
            "bounds": { "x": 0, "y": 600, "width": 1440, "height": 800 },
            "selector": "#pricing"
        }"##;
        let region: Region = serde_json::from_str(manifest).unwrap();
        assert_eq!(region.name, "pricing");
        assert_eq!(region.bounds.height, 800);
        assert_eq!(region.selector.as_deref(), Some("#pricing"));
    }
}
