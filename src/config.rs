//! Run configuration with environment variable support.
//!
//! This module provides the configuration structure for a fidelity run,
//! supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for CI use
//! - Builder pattern for programmatic configuration
//!
//! Configuration is an explicit value threaded through the run; there is no
//! global singleton, so independent runs (and tests) never share state.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DESIGN_FIDELITY_THRESHOLD_PASS` | Max diff ratio for PASS | `0.08` |
//! | `DESIGN_FIDELITY_THRESHOLD_WARN` | Max diff ratio for WARNING | `0.15` |
//! | `DESIGN_FIDELITY_PERCEPTUAL_THRESHOLD` | Per-pixel color-distance tolerance | `0.1` |
//! | `DESIGN_FIDELITY_FILL_COLOR` | Padding fill color as hex RGB(A) | `ffffff` |
//! | `DESIGN_FIDELITY_MAX_CONCURRENCY` | Worker threads per run | `1` |
//! | `DESIGN_FIDELITY_TIMEOUT_MS` | Per-operation timeout (ms) | `30000` |
//! | `DESIGN_FIDELITY_VIEWPORT_WIDTH` | Default viewport width (px) | `1440` |

use std::env;

// ============================================================================
// Default Values
// ============================================================================

/// Default upper bound on the diff ratio for a PASS classification
pub const DEFAULT_THRESHOLD_PASS: f64 = 0.08;

/// Default upper bound on the diff ratio for a WARNING classification
pub const DEFAULT_THRESHOLD_WARN: f64 = 0.15;

/// Default per-pixel perceptual color-distance tolerance
pub const DEFAULT_PERCEPTUAL_THRESHOLD: f64 = 0.1;

/// Default padding fill color (opaque white)
pub const DEFAULT_FILL_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Default highlight color for differing pixels in the diff raster
pub const DEFAULT_HIGHLIGHT_COLOR: [u8; 4] = [255, 0, 0, 255];

/// Default number of worker threads per run (sequential)
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Default per-operation timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default viewport width in pixels
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1440;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the PASS threshold
pub const ENV_THRESHOLD_PASS: &str = "DESIGN_FIDELITY_THRESHOLD_PASS";

/// Environment variable for the WARNING threshold
pub const ENV_THRESHOLD_WARN: &str = "DESIGN_FIDELITY_THRESHOLD_WARN";

/// Environment variable for the perceptual threshold
pub const ENV_PERCEPTUAL_THRESHOLD: &str = "DESIGN_FIDELITY_PERCEPTUAL_THRESHOLD";

/// Environment variable for the padding fill color
pub const ENV_FILL_COLOR: &str = "DESIGN_FIDELITY_FILL_COLOR";

/// Environment variable for max worker threads
pub const ENV_MAX_CONCURRENCY: &str = "DESIGN_FIDELITY_MAX_CONCURRENCY";

/// Environment variable for the per-operation timeout
pub const ENV_TIMEOUT_MS: &str = "DESIGN_FIDELITY_TIMEOUT_MS";

/// Environment variable for the default viewport width
pub const ENV_VIEWPORT_WIDTH: &str = "DESIGN_FIDELITY_VIEWPORT_WIDTH";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a fidelity run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Max diff ratio (inclusive) classified as PASS
    pub threshold_pass: f64,
    /// Max diff ratio (inclusive) classified as WARNING
    pub threshold_warn: f64,
    /// Per-pixel color-distance tolerance, in `[0, 1]`
    pub perceptual_threshold: f64,
    /// RGBA fill color used when padding mismatched captures onto a common canvas
    pub fill_color: [u8; 4],
    /// RGBA color used to highlight differing pixels in the diff raster
    pub highlight_color: [u8; 4],
    /// Number of sections processed concurrently (1 = sequential)
    pub max_concurrency: usize,
    /// Timeout applied to each design fetch and each browser capture (ms)
    pub timeout_ms: u64,
    /// Viewport width used when capturing the implementation (px)
    pub viewport_width: u32,
    /// When set, a canvas-size mismatch beyond this many pixels (in either
    /// dimension) forces the section to FAIL regardless of diff ratio.
    /// `None` pads silently and lets the diff ratio decide.
    pub size_mismatch_fail_px: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threshold_pass: DEFAULT_THRESHOLD_PASS,
            threshold_warn: DEFAULT_THRESHOLD_WARN,
            perceptual_threshold: DEFAULT_PERCEPTUAL_THRESHOLD,
            fill_color: DEFAULT_FILL_COLOR,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            size_mismatch_fail_px: None,
        }
    }
}

impl RunConfig {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threshold_pass: env_parse(ENV_THRESHOLD_PASS, defaults.threshold_pass),
            threshold_warn: env_parse(ENV_THRESHOLD_WARN, defaults.threshold_warn),
            perceptual_threshold: env_parse(
                ENV_PERCEPTUAL_THRESHOLD,
                defaults.perceptual_threshold,
            ),
            fill_color: env::var(ENV_FILL_COLOR)
                .ok()
                .and_then(|s| parse_hex_color(&s).ok())
                .unwrap_or(defaults.fill_color),
            max_concurrency: env_parse(ENV_MAX_CONCURRENCY, defaults.max_concurrency),
            timeout_ms: env_parse(ENV_TIMEOUT_MS, defaults.timeout_ms),
            viewport_width: env_parse(ENV_VIEWPORT_WIDTH, defaults.viewport_width),
            ..defaults
        }
    }

    pub fn thresholds(mut self, pass: f64, warn: f64) -> Self {
        self.threshold_pass = pass;
        self.threshold_warn = warn;
        self
    }

    pub fn perceptual_threshold(mut self, threshold: f64) -> Self {
        self.perceptual_threshold = threshold;
        self
    }

    pub fn fill_color(mut self, color: [u8; 4]) -> Self {
        self.fill_color = color;
        self
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn viewport_width(mut self, width: u32) -> Self {
        self.viewport_width = width;
        self
    }

    pub fn size_mismatch_fail_px(mut self, tolerance: Option<u32>) -> Self {
        self.size_mismatch_fail_px = tolerance;
        self
    }

    /// Validate threshold ordering and ranges.
    ///
    /// A run never starts with an invalid configuration; this is checked once
    /// before any capture work begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("threshold_pass", self.threshold_pass),
            ("threshold_warn", self.threshold_warn),
            ("perceptual_threshold", self.perceptual_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.threshold_pass > self.threshold_warn {
            return Err(ConfigError(format!(
                "threshold_pass ({}) must not exceed threshold_warn ({})",
                self.threshold_pass, self.threshold_warn
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError("max_concurrency must be at least 1".to_string()));
        }
        if self.viewport_width == 0 {
            return Err(ConfigError("viewport_width must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Error for invalid configuration or out-of-range region bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a hex color string into RGBA
/// Supports: "rrggbb" and "rrggbbaa", with or without a leading '#'
pub fn parse_hex_color(hex: &str) -> Result<[u8; 4], ConfigError> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return Err(ConfigError(format!(
            "color must be 6 or 8 hex digits (e.g., 'ffffff'), got '{}'",
            hex
        )));
    }
    let parse = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| ConfigError(format!("invalid hex color '{}'", hex)))
    };
    let r = parse(0..2)?;
    let g = parse(2..4)?;
    let b = parse(4..6)?;
    let a = if hex.len() == 8 { parse(6..8)? } else { 255 };
    Ok([r, g, b, a])
}
