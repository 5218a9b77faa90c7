pub mod runner;
pub mod types;

pub use runner::{CancelToken, SectionRunner};
pub use types::{
    Phase, Region, RunError, RunResult, SectionError, SectionResult, SectionSpec,
};
