//! Adaptive peak alignment
//!
//! `AlignmentController` repeats a relative scan, judges the principal
//! signal's peak and, if it is credible, moves the positioner onto it and
//! narrows the next window to the measured peak width.
//!
//! # Control Loop
//!
//! ```text
//! iteration = 0
//! while iteration < nscans:
//!     relative_scan(detectors, mover, rel_start, rel_end, points) ─▶ collector
//!     stats = principal signal
//!     if !strong_peak(stats) || too_wide(stats): stop (no move)
//!     move mover to feature(stats)
//!     if not last pass: rel_end = FWHM_FROM_SIGMA * sigma, rel_start = -rel_end
//!     iteration += 1
//! ```
//!
//! "No peak" is not an error: the loop just ends and the positioner stays
//! where the last good pass left it. Scan engine and positioner failures are
//! returned unchanged; nothing is retried.
//!
//! The feature name is resolved before the first scan, so a bad name fails
//! fast instead of after a full scan.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analysis::collector::{CollectorConfig, ScanStatisticsCollector};
use crate::analysis::peak::{PeakCriteria, FWHM_FROM_SIGMA};
use crate::analysis::statistics::SignalStatistics;
use crate::config::AlignConfig;
use crate::error::{AlignError, AlignResult, StatsError};
use crate::experiment::scan::{ScanEngine, ScanRequest};

/// Derived statistic the positioner is moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Signal-weighted mean position
    Centroid,
    /// Signal-weighted position spread
    Sigma,
    /// Position of the maximum signal
    XAtMaxY,
    /// Position of the minimum signal
    XAtMinY,
    /// Maximum signal
    MaxY,
    /// Minimum signal
    MinY,
    /// Mean signal
    MeanY,
    /// Signal standard deviation
    StddevY,
    /// Sample count
    N,
}

impl Feature {
    /// Canonical accessor name
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Centroid => "centroid",
            Feature::Sigma => "sigma",
            Feature::XAtMaxY => "x_at_max_y",
            Feature::XAtMinY => "x_at_min_y",
            Feature::MaxY => "max_y",
            Feature::MinY => "min_y",
            Feature::MeanY => "mean_y",
            Feature::StddevY => "stddev_y",
            Feature::N => "n",
        }
    }

    /// Read this feature from a statistics snapshot
    pub fn value(&self, stats: &SignalStatistics) -> Result<f64, StatsError> {
        match self {
            Feature::Centroid => stats.centroid(),
            Feature::Sigma => stats.sigma(),
            Feature::XAtMaxY => stats.x_at_max_y(),
            Feature::XAtMinY => stats.x_at_min_y(),
            Feature::MaxY => stats.max_y(),
            Feature::MinY => stats.min_y(),
            Feature::MeanY => stats.mean_y(),
            Feature::StddevY => stats.stddev_y(),
            Feature::N => Ok(stats.n() as f64),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = AlignError;

    /// Accepts the legacy aliases `com`, `cen`, `max`, `min` and every
    /// accessor name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = match s {
            "com" => "centroid",
            "cen" | "max" => "x_at_max_y",
            "min" => "x_at_min_y",
            other => other,
        };
        match canonical {
            "centroid" => Ok(Feature::Centroid),
            "sigma" => Ok(Feature::Sigma),
            "x_at_max_y" => Ok(Feature::XAtMaxY),
            "x_at_min_y" => Ok(Feature::XAtMinY),
            "max_y" => Ok(Feature::MaxY),
            "min_y" => Ok(Feature::MinY),
            "mean_y" => Ok(Feature::MeanY),
            "stddev_y" => Ok(Feature::StddevY),
            "n" => Ok(Feature::N),
            _ => Err(AlignError::Configuration(format!(
                "Unknown alignment feature '{}'",
                s
            ))),
        }
    }
}

/// Defaults for alignment requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Maximum number of scan passes
    pub nscans: usize,
    /// Feature to move to (accessor name or legacy alias)
    pub feature: String,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            nscans: 2,
            feature: Feature::Centroid.name().to_string(),
        }
    }
}

/// Parameters of one `align()` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct AlignRequest {
    /// Detector IDs; the first one is the principal signal
    pub detectors: Vec<String>,
    /// Positioner ID
    pub mover: String,
    /// Initial window start, relative to the current position
    pub rel_start: f64,
    /// Initial window end, relative to the current position
    pub rel_end: f64,
    /// Points per scan
    pub points: usize,
    /// Maximum number of passes
    pub nscans: usize,
    /// Feature name (accessor name or legacy alias)
    pub feature: String,
}

impl AlignRequest {
    /// Request with `nscans = 2` and `feature = "centroid"`
    pub fn new(detectors: &[&str], mover: &str, rel_start: f64, rel_end: f64, points: usize) -> Self {
        let defaults = AlignmentConfig::default();
        Self {
            detectors: detectors.iter().map(|d| d.to_string()).collect(),
            mover: mover.to_string(),
            rel_start,
            rel_end,
            points,
            nscans: defaults.nscans,
            feature: defaults.feature,
        }
    }

    /// Take `nscans` and `feature` from configuration
    pub fn with_config(mut self, config: &AlignmentConfig) -> Self {
        self.nscans = config.nscans;
        self.feature = config.feature.clone();
        self
    }

    /// Set the maximum number of passes
    pub fn with_nscans(mut self, nscans: usize) -> Self {
        self.nscans = nscans;
        self
    }

    /// Set the feature to move to
    pub fn with_feature(mut self, feature: &str) -> Self {
        self.feature = feature.to_string();
        self
    }
}

/// Why a pass did or did not move the positioner
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassOutcome {
    /// Peak accepted; positioner moved to `target`
    Moved {
        /// Absolute position commanded
        target: f64,
    },
    /// Scan produced no usable principal signal
    NoData,
    /// Signal too weak relative to its spread
    WeakPeak,
    /// Apparent peak fills the scan window
    TooWide,
    /// Peak accepted but the feature could not be computed
    FeatureUndefined,
}

/// Record of one scan pass
#[derive(Debug, Clone, PartialEq)]
pub struct AlignPass {
    /// Zero-based pass number
    pub iteration: usize,
    /// Window start used for this pass
    pub rel_start: f64,
    /// Window end used for this pass
    pub rel_end: f64,
    /// Measured sigma of the principal signal, if defined
    pub sigma: Option<f64>,
    /// What the pass did
    pub outcome: PassOutcome,
}

/// Repeats scans, recenters the positioner, and shrinks the window.
pub struct AlignmentController {
    engine: Arc<dyn ScanEngine>,
    collector: ScanStatisticsCollector,
    criteria: PeakCriteria,
    passes: Vec<AlignPass>,
}

impl AlignmentController {
    /// Controller with default collector settings and thresholds
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self::with_settings(engine, CollectorConfig::default(), PeakCriteria::default())
    }

    /// Controller with explicit collector settings and thresholds
    pub fn with_settings(
        engine: Arc<dyn ScanEngine>,
        collector: CollectorConfig,
        criteria: PeakCriteria,
    ) -> Self {
        Self {
            engine,
            collector: ScanStatisticsCollector::new(collector),
            criteria,
            passes: Vec::new(),
        }
    }

    /// Controller configured from a loaded [`AlignConfig`]
    pub fn from_config(engine: Arc<dyn ScanEngine>, config: &AlignConfig) -> Self {
        Self::with_settings(engine, config.collector.clone(), config.peak)
    }

    /// Collector holding the statistics of the most recent pass
    pub fn collector(&self) -> &ScanStatisticsCollector {
        &self.collector
    }

    /// Passes of the most recent `align()` call
    pub fn passes(&self) -> &[AlignPass] {
        &self.passes
    }

    /// Run the alignment loop.
    ///
    /// # Errors
    /// - `Configuration` for an unknown feature, an empty detector list,
    ///   zero points, or a mover the engine cannot resolve; raised before
    ///   any scan runs
    /// - `Collaborator` for any scan engine or positioner failure
    #[instrument(skip(self, request), fields(mover = %request.mover, nscans = request.nscans))]
    pub async fn align(&mut self, request: &AlignRequest) -> AlignResult<()> {
        let feature: Feature = request.feature.parse()?;
        if request.detectors.is_empty() {
            return Err(AlignError::Configuration(
                "Alignment needs at least one detector".to_string(),
            ));
        }
        if request.points == 0 {
            return Err(AlignError::Configuration(
                "Alignment scan needs at least one point".to_string(),
            ));
        }
        let mover = self.engine.movable(&request.mover).ok_or_else(|| {
            AlignError::Configuration(format!(
                "Device '{}' not found or not movable",
                request.mover
            ))
        })?;

        self.passes.clear();
        let mut rel_start = request.rel_start;
        let mut rel_end = request.rel_end;

        for iteration in 0..request.nscans {
            let scan = ScanRequest {
                detectors: request.detectors.clone(),
                mover: request.mover.clone(),
                rel_start,
                rel_end,
                points: request.points,
            };

            self.collector.suppress_next_report();
            self.engine.relative_scan(&scan, &mut self.collector).await?;
            self.collector.report();

            let (outcome, sigma) = self.judge(feature);
            self.passes.push(AlignPass {
                iteration,
                rel_start,
                rel_end,
                sigma,
                outcome,
            });

            let PassOutcome::Moved { target } = outcome else {
                info!(iteration, ?outcome, "No usable peak; ending alignment");
                break;
            };

            info!(iteration, feature = %feature, target, "Moving to peak");
            mover.move_abs(target).await?;
            mover.wait_settled().await?;

            if iteration + 1 < request.nscans {
                // An accepted peak is never too wide, so sigma is defined.
                let Some(sigma) = sigma else { break };
                rel_end = sigma * FWHM_FROM_SIGMA;
                rel_start = -rel_end;
                info!(iteration, rel_start, rel_end, "Narrowed window to peak width");
            }
        }

        Ok(())
    }

    /// Classify the principal signal of the last scan.
    fn judge(&self, feature: Feature) -> (PassOutcome, Option<f64>) {
        let Some(assessment) = self.collector.principal() else {
            return (PassOutcome::NoData, None);
        };
        let sigma = assessment.stats.sigma().ok();

        if !self.criteria.strong_peak(assessment.stats) {
            return (PassOutcome::WeakPeak, sigma);
        }
        if self.criteria.too_wide(&assessment) {
            return (PassOutcome::TooWide, sigma);
        }
        match feature.value(assessment.stats) {
            Ok(target) if target.is_finite() => (PassOutcome::Moved { target }, sigma),
            Ok(_) | Err(_) => {
                warn!(feature = %feature, "Feature undefined for accepted peak");
                (PassOutcome::FeatureUndefined, sigma)
            }
        }
    }
}
