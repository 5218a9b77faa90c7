pub mod capture;
pub mod design;

pub use capture::{
    BrowserDriver, BrowserSession, CaptureError, PageImageDriver, capture_region,
};
pub use design::{
    DesignFetchError, DesignRef, DesignSource, FetchErrorCode, FileDesignSource,
    HttpDesignSource, InMemoryDesignSource,
};
