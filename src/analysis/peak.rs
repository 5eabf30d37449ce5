//! Peak-quality classification
//!
//! Pure functions deciding whether the statistics of one signal describe a
//! credible, well-resolved peak. Undefined statistics never escape from here:
//! every `StatsError` turns into the conservative verdict ("not a peak" or
//! "too wide").

use serde::{Deserialize, Serialize};

use crate::analysis::statistics::SignalStatistics;

/// FWHM of a Gaussian in units of its standard deviation, `2*sqrt(2*ln 2)`.
pub const FWHM_FROM_SIGMA: f64 = 2.35482;

/// Minimum `(max_y - min_y) / sigma` for a strong peak.
pub const STRONG_PEAK_RATIO: f64 = 2.5;

/// Minimum `|max_y / min_y|` when sigma is unusable.
pub const FALLBACK_RATIO: f64 = 4.0;

/// Largest fraction of the scanned range the FWHM may occupy.
pub const TOO_WIDE_FRACTION: f64 = 0.9;

/// Observed range of positions in one scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XExtent {
    /// Smallest position seen
    pub min: f64,
    /// Largest position seen
    pub max: f64,
}

impl XExtent {
    /// Extent covering a single position
    pub fn at(x: f64) -> Self {
        Self { min: x, max: x }
    }

    /// Widen to include `x`
    pub fn include(&mut self, x: f64) {
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    /// `max - min`
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Read-only view of one signal's statistics plus the scanned x extent.
#[derive(Debug, Clone, Copy)]
pub struct PeakAssessment<'a> {
    /// Statistics of the signal
    pub stats: &'a SignalStatistics,
    /// Range of positions the scan covered, `None` if no event was seen
    pub x_extent: Option<XExtent>,
}

/// Thresholds used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakCriteria {
    /// See [`STRONG_PEAK_RATIO`]
    pub strong_peak_ratio: f64,
    /// See [`FALLBACK_RATIO`]
    pub fallback_ratio: f64,
    /// See [`TOO_WIDE_FRACTION`]
    pub too_wide_fraction: f64,
}

impl Default for PeakCriteria {
    fn default() -> Self {
        Self {
            strong_peak_ratio: STRONG_PEAK_RATIO,
            fallback_ratio: FALLBACK_RATIO,
            too_wide_fraction: TOO_WIDE_FRACTION,
        }
    }
}

impl PeakCriteria {
    /// True when the signal rises well above its spread in position.
    ///
    /// Primary test: `(max_y - min_y) / sigma > strong_peak_ratio`. When
    /// sigma is undefined or zero, falls back to
    /// `|max_y / min_y| > fallback_ratio`; when that is undefined too, the
    /// answer is false.
    pub fn strong_peak(&self, stats: &SignalStatistics) -> bool {
        let (Ok(max_y), Ok(min_y)) = (stats.max_y(), stats.min_y()) else {
            return false;
        };

        match stats.sigma() {
            Ok(sigma) if sigma > 0.0 && sigma.is_finite() => {
                (max_y - min_y) / sigma > self.strong_peak_ratio
            }
            _ => {
                if min_y == 0.0 {
                    return false;
                }
                let ratio = (max_y / min_y).abs();
                ratio.is_finite() && ratio > self.fallback_ratio
            }
        }
    }

    /// True when the apparent peak fills nearly the whole scanned window.
    ///
    /// `FWHM_FROM_SIGMA * sigma > too_wide_fraction * x_range`. An empty or
    /// zero-width scan, or an undefined sigma, counts as too wide.
    pub fn too_wide(&self, assessment: &PeakAssessment<'_>) -> bool {
        let Some(extent) = assessment.x_extent else {
            return true;
        };
        let x_range = extent.range();
        if !(x_range > 0.0) || !x_range.is_finite() {
            return true;
        }
        match assessment.stats.sigma() {
            Ok(sigma) => FWHM_FROM_SIGMA * sigma > self.too_wide_fraction * x_range,
            Err(_) => true,
        }
    }

    /// Strong and not too wide: worth moving to.
    pub fn is_good_peak(&self, assessment: &PeakAssessment<'_>) -> bool {
        self.strong_peak(assessment.stats) && !self.too_wide(assessment)
    }
}

/// [`PeakCriteria::strong_peak`] with the default thresholds.
pub fn strong_peak(stats: &SignalStatistics) -> bool {
    PeakCriteria::default().strong_peak(stats)
}

/// [`PeakCriteria::too_wide`] with the default thresholds.
pub fn too_wide(assessment: &PeakAssessment<'_>) -> bool {
    PeakCriteria::default().too_wide(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(points: &[(f64, f64)]) -> (SignalStatistics, Option<XExtent>) {
        let mut stats = SignalStatistics::new();
        let mut extent: Option<XExtent> = None;
        for &(x, y) in points {
            stats.add(x, y);
            if let Some(e) = extent.as_mut() {
                e.include(x);
            } else {
                extent = Some(XExtent::at(x));
            }
        }
        (stats, extent)
    }

    fn gaussian_scan(center: f64, width: f64, start: f64, stop: f64, n: usize) -> Vec<(f64, f64)> {
        let step = (stop - start) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                let x = start + step * i as f64;
                (x, 1000.0 * (-(x - center).powi(2) / (2.0 * width * width)).exp())
            })
            .collect()
    }

    #[test]
    fn test_clean_gaussian_is_good_peak() {
        let (stats, extent) = scan(&gaussian_scan(1.1, 0.1, -1.9, 4.1, 21));
        let assessment = PeakAssessment {
            stats: &stats,
            x_extent: extent,
        };
        assert!((stats.centroid().unwrap() - 1.1).abs() < 0.05);
        assert!(strong_peak(&stats));
        assert!(!too_wide(&assessment));
        assert!(PeakCriteria::default().is_good_peak(&assessment));
    }

    #[test]
    fn test_flat_signal_is_not_strong() {
        let points: Vec<(f64, f64)> = (0..21).map(|i| (i as f64 * 0.1, 5.0)).collect();
        let (stats, _) = scan(&points);
        assert!(!strong_peak(&stats));
    }

    #[test]
    fn test_single_point_uses_fallback() {
        // sigma == 0, max/min == 1
        let (stats, extent) = scan(&[(0.0, 10.0)]);
        assert!(!strong_peak(&stats));
        assert!(too_wide(&PeakAssessment {
            stats: &stats,
            x_extent: extent,
        }));
    }

    #[test]
    fn test_fallback_ratio_when_sigma_zero() {
        // All weight at one position: sigma == 0, |max/min| = 10
        let (stats, _) = scan(&[(1.0, 10.0), (1.0, 1.0)]);
        assert_eq!(stats.sigma().unwrap(), 0.0);
        assert!(strong_peak(&stats));

        // Zero total weight leaves sigma undefined, and min_y == 0 leaves
        // the fallback undefined as well
        let (stats, _) = scan(&[(0.0, 0.0), (1.0, 0.0)]);
        assert!(stats.sigma().is_err());
        assert!(!strong_peak(&stats));
    }

    #[test]
    fn test_empty_stats_are_rejected() {
        let stats = SignalStatistics::new();
        assert!(!strong_peak(&stats));
        assert!(too_wide(&PeakAssessment {
            stats: &stats,
            x_extent: None,
        }));
    }

    #[test]
    fn test_peak_filling_window_is_too_wide() {
        // Signal concentrated at both window edges: the apparent peak is
        // wider than the scan. It still passes the strength test.
        let points: Vec<(f64, f64)> = (0..21)
            .map(|i| {
                let x = -1.0 + 0.1 * i as f64;
                let y = if i == 0 || i == 20 { 100.0 } else { 1.0 };
                (x, y)
            })
            .collect();
        let (stats, extent) = scan(&points);
        let assessment = PeakAssessment {
            stats: &stats,
            x_extent: extent,
        };
        assert!(strong_peak(&stats));
        assert!(too_wide(&assessment));
        assert!(!PeakCriteria::default().is_good_peak(&assessment));
    }

    #[test]
    fn test_zero_range_is_too_wide() {
        let (stats, _) = scan(&[(1.0, 3.0), (1.0, 9.0)]);
        assert!(too_wide(&PeakAssessment {
            stats: &stats,
            x_extent: Some(XExtent::at(1.0)),
        }));
    }

    #[test]
    fn test_custom_criteria() {
        let (stats, _) = scan(&gaussian_scan(0.0, 0.3, -1.0, 1.0, 21));
        let strict = PeakCriteria {
            strong_peak_ratio: 1e9,
            ..Default::default()
        };
        assert!(strong_peak(&stats));
        assert!(!strict.strong_peak(&stats));
    }
}
