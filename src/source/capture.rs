//! Implementation capture: browser driver contract and fallback policy.
//!
//! The capture policy always runs in priority order: screenshot the element
//! matched by the region selector when one is configured and found, and fall
//! back to scrolling the region into view and clipping a viewport screenshot
//! when the markup lacks the expected hook. Selector capture is preferred
//! because it tracks real element geometry.

use log::debug;

use crate::normalize::{crop_to_bounds, Bounds};
use crate::raster::RasterImage;
use crate::run::Region;

/// Error during implementation capture
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// The selector matched nothing
    SelectorNotFound(String),

    /// Navigation to the page failed
    Navigation(String),

    /// The navigation or screenshot exceeded its timeout (ms)
    Timeout(u64),

    /// Driver-level failure taking or encoding the screenshot
    Driver(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::SelectorNotFound(sel) => {
                write!(f, "Selector not found: '{}'", sel)
            }
            CaptureError::Navigation(msg) => write!(f, "Navigation failed: {}", msg),
            CaptureError::Timeout(ms) => write!(f, "Capture timed out after {}ms", ms),
            CaptureError::Driver(msg) => write!(f, "Capture driver error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Low-level headless-browser contract consumed by the capture policy.
///
/// Implementations wrap a real browser driver or, like [`PageImageDriver`],
/// a pre-rendered page screenshot. A driver is a scoped resource: opened
/// once per run and reused across every region capture of that run.
pub trait BrowserDriver: Send {
    /// Navigate to a URL; a no-op when the page is already current
    fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), CaptureError>;

    /// Set the viewport width (px) used for subsequent captures.
    ///
    /// Called once per run, before any capture. Drivers without viewport
    /// control keep the default no-op.
    fn set_viewport(&mut self, _width: u32) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Screenshot the element matched by a CSS selector.
    /// Returns `CaptureError::SelectorNotFound` when nothing matches.
    fn screenshot_element(&mut self, selector: &str, timeout_ms: u64)
    -> Result<Vec<u8>, CaptureError>;

    /// Scroll the page so the given y offset sits at the viewport top
    fn scroll_to(&mut self, y: u32) -> Result<(), CaptureError>;

    /// Screenshot a clipped area of the page, in page coordinates
    fn screenshot_clip(&mut self, bounds: &Bounds, timeout_ms: u64)
    -> Result<Vec<u8>, CaptureError>;

    /// Driver type identifier (e.g., "page_image", "cdp")
    fn driver_type(&self) -> &str;

    /// Release the underlying browser resources
    fn close(&mut self) {}
}

/// Capture the raster for one region, following the fallback chain.
///
/// Order is fixed: (1) element screenshot via `region.selector` when
/// present; (2) on a missing selector only, scroll `region.bounds.y` to the
/// viewport top and clip `region.bounds`. Any other selector-capture error
/// propagates, since falling back would mask a real driver problem.
pub fn capture_region(
    driver: &mut dyn BrowserDriver,
    url: &str,
    region: &Region,
    timeout_ms: u64,
) -> Result<Vec<u8>, CaptureError> {
    driver.navigate(url, timeout_ms)?;

    if let Some(selector) = &region.selector {
        match driver.screenshot_element(selector, timeout_ms) {
            Ok(bytes) => {
                debug!("region '{}': selector capture via '{}'", region.name, selector);
                return Ok(bytes);
            }
            Err(CaptureError::SelectorNotFound(_)) => {
                debug!(
                    "region '{}': selector '{}' not found, falling back to viewport clip",
                    region.name, selector
                );
            }
            Err(e) => return Err(e),
        }
    }

    driver.scroll_to(region.bounds.y)?;
    driver.screenshot_clip(&region.bounds, timeout_ms)
}

/// Browser session scoped to one run.
///
/// Owns the boxed driver and guarantees it closes on both normal completion
/// and fatal error, via `Drop`.
pub struct BrowserSession {
    driver: Box<dyn BrowserDriver>,
    closed: bool,
}

impl BrowserSession {
    pub fn new(driver: Box<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            closed: false,
        }
    }

    /// Configure the driver viewport for this run's captures
    pub fn set_viewport(&mut self, width: u32) -> Result<(), CaptureError> {
        self.driver.set_viewport(width)
    }

    /// Capture one region with the session's driver
    pub fn capture_region(
        &mut self,
        url: &str,
        region: &Region,
        timeout_ms: u64,
    ) -> Result<Vec<u8>, CaptureError> {
        capture_region(self.driver.as_mut(), url, region, timeout_ms)
    }

    pub fn driver_type(&self) -> &str {
        self.driver.driver_type()
    }

    /// Close the session explicitly
    pub fn close(&mut self) {
        if !self.closed {
            self.driver.close();
            self.closed = true;
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Driver over a pre-rendered full-page screenshot.
///
/// Selector lookups resolve through a registered selector→bounds map, and
/// viewport clips crop the page raster directly. This is the production
/// path for CI setups that render the page once up front, and the test
/// double for everything else.
pub struct PageImageDriver {
    page: RasterImage,
    selectors: std::collections::HashMap<String, Bounds>,
    current_url: Option<String>,
    scroll_y: u32,
    viewport_width: u32,
}

impl PageImageDriver {
    /// Build a driver from an in-memory page raster
    pub fn from_image(page: RasterImage) -> Self {
        Self {
            page,
            selectors: std::collections::HashMap::new(),
            current_url: None,
            scroll_y: 0,
            viewport_width: crate::config::DEFAULT_VIEWPORT_WIDTH,
        }
    }

    /// Build a driver from a page screenshot on disk
    pub fn from_file(path: &std::path::Path) -> Result<Self, CaptureError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CaptureError::Driver(format!("failed to read {}: {}", path.display(), e)))?;
        let page = RasterImage::from_png_bytes(&bytes)
            .map_err(|e| CaptureError::Driver(e.to_string()))?;
        Ok(Self::from_image(page))
    }

    /// Register the bounds an element selector resolves to
    pub fn with_selector(mut self, selector: impl Into<String>, bounds: Bounds) -> Self {
        self.selectors.insert(selector.into(), bounds);
        self
    }

    /// Current scroll offset, page coordinates
    pub fn scroll_y(&self) -> u32 {
        self.scroll_y
    }

    /// Configured viewport width. The page raster is pre-rendered, so the
    /// width is bookkeeping here; a live browser driver resizes its window.
    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }
}

impl BrowserDriver for PageImageDriver {
    fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<(), CaptureError> {
        self.current_url = Some(url.to_string());
        self.scroll_y = 0;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32) -> Result<(), CaptureError> {
        self.viewport_width = width;
        Ok(())
    }

    fn screenshot_element(
        &mut self,
        selector: &str,
        _timeout_ms: u64,
    ) -> Result<Vec<u8>, CaptureError> {
        let bounds = self
            .selectors
            .get(selector)
            .copied()
            .ok_or_else(|| CaptureError::SelectorNotFound(selector.to_string()))?;
        let cropped = crop_to_bounds(&self.page, &bounds)
            .map_err(|e| CaptureError::Driver(e.to_string()))?;
        cropped
            .to_png()
            .map_err(|e| CaptureError::Driver(e.to_string()))
    }

    fn scroll_to(&mut self, y: u32) -> Result<(), CaptureError> {
        self.scroll_y = y;
        Ok(())
    }

    fn screenshot_clip(
        &mut self,
        bounds: &Bounds,
        _timeout_ms: u64,
    ) -> Result<Vec<u8>, CaptureError> {
        let cropped = crop_to_bounds(&self.page, bounds)
            .map_err(|e| CaptureError::Driver(e.to_string()))?;
        cropped
            .to_png()
            .map_err(|e| CaptureError::Driver(e.to_string()))
    }

    fn driver_type(&self) -> &str {
        "page_image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::Region;

    fn page_with_marker() -> RasterImage {
        let mut page = RasterImage::with_color(300, 200, [255, 255, 255, 255]);
        page.draw_rect(50, 50, 40, 30, [0, 128, 0, 255]);
        page
    }

    fn region(selector: Option<&str>) -> Region {
        Region {
            name: "hero".to_string(),
            bounds: Bounds::new(50, 50, 40, 30),
            selector: selector.map(String::from),
        }
    }

    #[test]
    fn test_selector_capture_preferred() {
        let mut driver = PageImageDriver::from_image(page_with_marker())
            .with_selector("#hero", Bounds::new(50, 50, 40, 30));

        let bytes =
            capture_region(&mut driver, "http://localhost:3000", &region(Some("#hero")), 1000)
                .unwrap();
        let img = RasterImage::from_png_bytes(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
        assert_eq!(img.get_pixel(0, 0), [0, 128, 0, 255]);
        // No fallback scroll happened
        assert_eq!(driver.scroll_y(), 0);
    }

    #[test]
    fn test_missing_selector_falls_back_to_viewport_clip() {
        let mut driver = PageImageDriver::from_image(page_with_marker());

        let bytes = capture_region(
            &mut driver,
            "http://localhost:3000",
            &region(Some("#does-not-exist")),
            1000,
        )
        .unwrap();
        let img = RasterImage::from_png_bytes(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
        assert_eq!(img.get_pixel(0, 0), [0, 128, 0, 255]);
        // Fallback scrolled the region to the viewport top
        assert_eq!(driver.scroll_y(), 50);
    }

    #[test]
    fn test_no_selector_goes_straight_to_clip() {
        let mut driver = PageImageDriver::from_image(page_with_marker());
        let bytes =
            capture_region(&mut driver, "http://localhost:3000", &region(None), 1000).unwrap();
        let img = RasterImage::from_png_bytes(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_page_driver_records_viewport_width() {
        let mut driver = PageImageDriver::from_image(page_with_marker());
        assert_eq!(driver.viewport_width(), crate::config::DEFAULT_VIEWPORT_WIDTH);
        driver.set_viewport(1024).unwrap();
        assert_eq!(driver.viewport_width(), 1024);
    }

    #[test]
    fn test_clip_outside_page_is_driver_error() {
        let mut driver = PageImageDriver::from_image(page_with_marker());
        let mut r = region(None);
        r.bounds = Bounds::new(500, 500, 10, 10);
        let err = capture_region(&mut driver, "http://localhost:3000", &r, 1000).unwrap_err();
        assert!(matches!(err, CaptureError::Driver(_)));
    }

    #[test]
    fn test_session_closes_on_drop() {
        struct ClosableDriver {
            closed: std::sync::Arc<std::sync::atomic::AtomicBool>,
        }
        impl BrowserDriver for ClosableDriver {
            fn navigate(&mut self, _: &str, _: u64) -> Result<(), CaptureError> {
                Ok(())
            }
            fn screenshot_element(&mut self, s: &str, _: u64) -> Result<Vec<u8>, CaptureError> {
                Err(CaptureError::SelectorNotFound(s.to_string()))
            }
            fn scroll_to(&mut self, _: u32) -> Result<(), CaptureError> {
                Ok(())
            }
            fn screenshot_clip(&mut self, _: &Bounds, _: u64) -> Result<Vec<u8>, CaptureError> {
                Err(CaptureError::Driver("no page".to_string()))
            }
            fn driver_type(&self) -> &str {
                "closable"
            }
            fn close(&mut self) {
                self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        {
            let _session = BrowserSession::new(Box::new(ClosableDriver {
                closed: closed.clone(),
            }));
        }
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
