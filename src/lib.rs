//! Design Fidelity - region-by-region visual comparison of web
//! implementations against authoritative design references.
//!
//! This crate provides:
//! - Design-reference fetching (file exports, in-memory, Figma-style HTTP)
//! - Implementation capture with a selector-then-viewport-clip fallback
//! - Region normalization (crop + pad onto a common canvas, never scale)
//! - Perceptual pixel diffing tolerant of anti-aliasing noise
//! - PASS/WARNING/FAIL quality gating and run-level aggregation
//! - A section runner with fault isolation between regions
//!
//! # Example
//!
//! ```rust
//! use design_fidelity::{
//!     Bounds, DesignRef, InMemoryDesignSource, PageImageDriver, RasterImage,
//!     Region, RunConfig, SectionRunner, SectionSpec,
//! };
//!
//! let page = RasterImage::with_color(200, 200, [255, 255, 255, 255]);
//! let design = InMemoryDesignSource::new().with_region(
//!     DesignRef::new("homepage", "hero"),
//!     RasterImage::with_color(100, 100, [255, 255, 255, 255]).to_png().unwrap(),
//! );
//!
//! let runner = SectionRunner::new(
//!     RunConfig::default(),
//!     Box::new(design),
//!     Box::new(PageImageDriver::from_image(page)),
//! );
//! let sections = vec![SectionSpec::new(
//!     Region::new("hero", Bounds::new(0, 0, 100, 100)),
//!     DesignRef::new("homepage", "hero"),
//! )];
//! let result = runner.run("http://localhost:3000", &sections).unwrap();
//! println!("{}", result.overall_status);
//! ```

pub mod config;
pub mod diff;
pub mod gate;
pub mod normalize;
pub mod raster;
pub mod run;
pub mod source;

// Re-export configuration
pub use config::{ConfigError, RunConfig, parse_hex_color};

// Re-export raster and normalization types
pub use normalize::{Bounds, crop_to_bounds, normalize as normalize_pair, pad_to_canvas};
pub use raster::{RasterError, RasterImage};

// Re-export diff engine
pub use diff::{DiffError, DiffOptions, DiffResult, diff, diff_with_options, pixel_distance};

// Re-export quality gate
pub use gate::{Classification, Thresholds, aggregate_run, classify};

// Re-export sources
pub use source::{
    BrowserDriver, BrowserSession, CaptureError, DesignFetchError, DesignRef, DesignSource,
    FetchErrorCode, FileDesignSource, HttpDesignSource, InMemoryDesignSource, PageImageDriver,
    capture_region,
};

// Re-export run types and runner
pub use run::{
    CancelToken, Phase, Region, RunError, RunResult, SectionError, SectionResult, SectionRunner,
    SectionSpec,
};
