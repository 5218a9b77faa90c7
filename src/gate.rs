//! Quality gate: classify a diff ratio into a fidelity tier and aggregate
//! per-section classifications into one run status.

use serde::{Deserialize, Serialize};

/// Fidelity tier for a section or a whole run, totally ordered
/// `Pass < Warning < Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Pass,
    Warning,
    Fail,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Pass => write!(f, "PASS"),
            Classification::Warning => write!(f, "WARNING"),
            Classification::Fail => write!(f, "FAIL"),
        }
    }
}

/// Classification thresholds, both inclusive upper bounds
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Max diff ratio classified as PASS
    pub pass: f64,
    /// Max diff ratio classified as WARNING
    pub warn: f64,
}

impl Thresholds {
    pub fn new(pass: f64, warn: f64) -> Self {
        Self { pass, warn }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pass: crate::config::DEFAULT_THRESHOLD_PASS,
            warn: crate::config::DEFAULT_THRESHOLD_WARN,
        }
    }
}

/// Classify a diff ratio against the thresholds.
///
/// Boundaries are closed on the lower tier: a ratio exactly at the pass
/// threshold is still PASS.
pub fn classify(diff_ratio: f64, thresholds: &Thresholds) -> Classification {
    if diff_ratio <= thresholds.pass {
        Classification::Pass
    } else if diff_ratio <= thresholds.warn {
        Classification::Warning
    } else {
        Classification::Fail
    }
}

/// Aggregate per-section outcomes into a run-level classification.
///
/// `None` entries are errored sections; they count as FAIL. An empty run is
/// vacuously PASS.
pub fn aggregate_run<I>(outcomes: I) -> Classification
where
    I: IntoIterator<Item = Option<Classification>>,
{
    outcomes
        .into_iter()
        .map(|c| c.unwrap_or(Classification::Fail))
        .max()
        .unwrap_or(Classification::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(0.08, &t), Classification::Pass);
        assert_eq!(classify(0.081, &t), Classification::Warning);
        assert_eq!(classify(0.15, &t), Classification::Warning);
        assert_eq!(classify(0.151, &t), Classification::Fail);
    }

    #[test]
    fn test_classify_extremes() {
        let t = Thresholds::default();
        assert_eq!(classify(0.0, &t), Classification::Pass);
        assert_eq!(classify(1.0, &t), Classification::Fail);
    }

    #[test]
    fn test_ordering() {
        assert!(Classification::Pass < Classification::Warning);
        assert!(Classification::Warning < Classification::Fail);
    }

    #[test]
    fn test_aggregate_empty_is_pass() {
        assert_eq!(aggregate_run(Vec::new()), Classification::Pass);
    }

    #[test]
    fn test_aggregate_worst_wins() {
        use Classification::*;
        assert_eq!(aggregate_run(vec![Some(Pass), Some(Warning)]), Warning);
        assert_eq!(aggregate_run(vec![Some(Pass), Some(Fail)]), Fail);
        assert_eq!(aggregate_run(vec![Some(Pass), Some(Pass)]), Pass);
    }

    #[test]
    fn test_aggregate_errored_section_counts_as_fail() {
        use Classification::*;
        assert_eq!(aggregate_run(vec![Some(Pass), None]), Fail);
    }
}
