//! Section runner: orchestrates the per-region pipeline with fault
//! isolation between regions.
//!
//! Each region moves through `PENDING → FETCHING_DESIGN → CAPTURING_IMPL →
//! NORMALIZING → DIFFING → CLASSIFIED`; an error at any phase terminates
//! that region as `FAILED` with the error recorded, and never aborts the
//! others. Results are stored index-addressed, so section order always
//! matches the input region order regardless of execution strategy.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::config::{ConfigError, RunConfig};
use crate::diff::{DiffError, DiffOptions, diff_with_options};
use crate::gate::{Thresholds, aggregate_run, classify};
use crate::normalize::{Bounds, crop_to_bounds, normalize};
use crate::raster::RasterImage;
use crate::run::types::{Phase, RunError, RunResult, SectionError, SectionResult, SectionSpec};
use crate::source::{BrowserDriver, BrowserSession, DesignSource};

/// External cancellation signal, checked between pipeline phases.
///
/// Cancelling short-circuits sections that have not yet reached a terminal
/// state; sections already past their last check still finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the full per-region pipeline for a configured set of sections.
///
/// Owns the run-scoped resources: the design source and the browser
/// session, each acquired once and shared across all sections of the run.
/// There is no other state; two runners never interfere.
pub struct SectionRunner {
    config: RunConfig,
    design: Mutex<Box<dyn DesignSource>>,
    browser: Mutex<BrowserSession>,
    cancel: CancelToken,
}

impl SectionRunner {
    pub fn new(
        config: RunConfig,
        design: Box<dyn DesignSource>,
        driver: Box<dyn BrowserDriver>,
    ) -> Self {
        Self {
            config,
            design: Mutex::new(design),
            browser: Mutex::new(BrowserSession::new(driver)),
            cancel: CancelToken::new(),
        }
    }

    /// Token for cancelling this run from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the run: one section per spec, in input order.
    ///
    /// Fatal errors (invalid configuration, invalid region list, or a browser
    /// session that cannot be set up) abort before any capture begins.
    /// Per-section errors are recorded on their section and never propagate
    /// past this boundary.
    pub fn run(&self, url: &str, sections: &[SectionSpec]) -> Result<RunResult, RunError> {
        self.config.validate()?;
        validate_sections(sections)?;

        // Every capture of the run shares one viewport; a driver that cannot
        // honor it would fail every section identically, so this is fatal.
        lock_unpoisoned(&self.browser)
            .set_viewport(self.config.viewport_width)
            .map_err(|e| RunError::System(format!("viewport setup failed: {}", e)))?;

        info!(
            "starting fidelity run: {} sections against {} ({} workers)",
            sections.len(),
            url,
            self.config.max_concurrency
        );

        let total = sections.len();
        let slots: Mutex<Vec<Option<SectionResult>>> = Mutex::new(vec![None; total]);
        let next = AtomicUsize::new(0);
        let workers = self.config.max_concurrency.min(total.max(1));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        if idx >= total {
                            break;
                        }
                        let result = self.run_section(url, &sections[idx]);
                        lock_unpoisoned(&slots)[idx] = Some(result);
                    }
                });
            }
        });

        // The scope join above means every section is terminal before the
        // run result is assembled.
        let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut results = Vec::with_capacity(total);
        for (spec, slot) in sections.iter().zip(slots) {
            results.push(slot.unwrap_or_else(|| {
                SectionResult::failed(spec.region.clone(), Phase::Pending, SectionError::Cancelled)
            }));
        }

        let overall_status = aggregate_run(results.iter().map(|s| s.classification));
        let failed = results.iter().filter(|s| s.is_failed()).count();
        info!(
            "run finished: {} -> {} sections, {} failed",
            overall_status,
            results.len(),
            failed
        );

        Ok(RunResult {
            timestamp: Utc::now(),
            sections: results,
            overall_status,
        })
    }

    /// Run one region through the pipeline. Never panics or propagates; any
    /// error becomes a `FAILED` section carrying the phase it occurred in.
    fn run_section(&self, url: &str, spec: &SectionSpec) -> SectionResult {
        let region = &spec.region;
        let mut phase = Phase::Pending;

        let outcome = self.advance_section(url, spec, &mut phase);
        match outcome {
            Ok(result) => {
                debug!(
                    "section '{}' classified {} (ratio {:.4})",
                    region.name,
                    result.classification.map(|c| c.to_string()).unwrap_or_default(),
                    result.diff.as_ref().map(|d| d.diff_ratio).unwrap_or_default()
                );
                result
            }
            Err(error) => {
                warn!("section '{}' failed during {}: {}", region.name, phase, error);
                SectionResult::failed(region.clone(), phase, error)
            }
        }
    }

    fn advance_section(
        &self,
        url: &str,
        spec: &SectionSpec,
        phase: &mut Phase,
    ) -> Result<SectionResult, SectionError> {
        let region = &spec.region;
        let timeout_ms = self.config.timeout_ms;

        self.checkpoint()?;
        *phase = Phase::FetchingDesign;
        debug!("section '{}': fetching design {}", region.name, spec.design);
        let design_bytes = lock_unpoisoned(&self.design).fetch_region(&spec.design, timeout_ms)?;

        self.checkpoint()?;
        *phase = Phase::CapturingImpl;
        debug!("section '{}': capturing implementation", region.name);
        let impl_bytes = lock_unpoisoned(&self.browser).capture_region(url, region, timeout_ms)?;

        self.checkpoint()?;
        *phase = Phase::Normalizing;
        let design_img = decode(&design_bytes)?;
        let impl_img = decode(&impl_bytes)?;
        // Clamp the implementation capture to the requested bounds size;
        // element screenshots can exceed the configured region.
        let clip = Bounds::new(0, 0, region.bounds.width, region.bounds.height);
        let impl_img = crop_to_bounds(&impl_img, &clip)?;

        let size_mismatch = design_img.width() != impl_img.width()
            || design_img.height() != impl_img.height();
        let mismatch_px = design_img.width().abs_diff(impl_img.width())
            .max(design_img.height().abs_diff(impl_img.height()));
        let (design_img, impl_img) = normalize(&design_img, &impl_img, self.config.fill_color);

        self.checkpoint()?;
        *phase = Phase::Diffing;
        let options = DiffOptions::new(self.config.perceptual_threshold)
            .highlight_color(self.config.highlight_color);
        let diff = diff_with_options(&design_img, &impl_img, &options)?;

        let thresholds = Thresholds::new(self.config.threshold_pass, self.config.threshold_warn);
        let mut classification = classify(diff.diff_ratio, &thresholds);
        if let Some(tolerance) = self.config.size_mismatch_fail_px {
            if size_mismatch && mismatch_px > tolerance {
                warn!(
                    "section '{}': canvas mismatch of {}px exceeds tolerance {}px, forcing FAIL",
                    region.name, mismatch_px, tolerance
                );
                classification = crate::gate::Classification::Fail;
            }
        }

        *phase = Phase::Classified;
        Ok(SectionResult::classified(
            region.clone(),
            diff,
            classification,
            size_mismatch,
            design_img,
            impl_img,
        ))
    }

    fn checkpoint(&self) -> Result<(), SectionError> {
        if self.cancel.is_cancelled() {
            Err(SectionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Fatal upfront validation of the region list
fn validate_sections(sections: &[SectionSpec]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for spec in sections {
        let region = &spec.region;
        if region.name.is_empty() {
            return Err(ConfigError("region with empty name".to_string()));
        }
        if !names.insert(region.name.as_str()) {
            return Err(ConfigError(format!(
                "duplicate region name '{}'",
                region.name
            )));
        }
        if region.bounds.width == 0 || region.bounds.height == 0 {
            return Err(ConfigError(format!(
                "region '{}' has empty bounds {}",
                region.name, region.bounds
            )));
        }
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> Result<RasterImage, SectionError> {
    RasterImage::from_png_bytes(bytes)
        .map_err(|e| SectionError::Diff(DiffError::CorruptImage(e.to_string())))
}

/// Recover the guard from a poisoned mutex; a section that panicked has
/// already been isolated, the shared resource stays usable.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
