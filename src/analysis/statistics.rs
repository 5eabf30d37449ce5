//! Online weighted-moment accumulator for one scan signal.
//!
//! `SignalStatistics` folds `(x, y)` samples into a fixed set of running sums
//! and derives everything else at read time, so memory is O(1) in the number
//! of samples and the result does not depend on arrival order (up to
//! floating-point summation order). Only the extrema positions are
//! order-sensitive: ties resolve to the first occurrence.
//!
//! Position sums are kept relative to the first sample's `x`, so a narrow
//! window far from the origin keeps its dispersion.
//!
//! # Example
//!
//! ```
//! use daq_align::analysis::statistics::SignalStatistics;
//!
//! let mut stats = SignalStatistics::new();
//! for (x, y) in [(0.0, 1.0), (1.0, 3.0), (2.0, 1.0)] {
//!     stats.add(x, y);
//! }
//! assert_eq!(stats.n(), 3);
//! assert!((stats.centroid().unwrap() - 1.0).abs() < 1e-12);
//! ```

use crate::error::StatsError;

type StatsResult = Result<f64, StatsError>;

/// An extremum and the position where it was first seen.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Extremum {
    y: f64,
    x: f64,
}

/// Running sums for one signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalStatistics {
    n: usize,
    /// Reference position, fixed by the first sample
    shift: f64,
    sum_y: f64,
    sum_y2: f64,
    /// Σ (x - shift)·y
    sum_dxy: f64,
    /// Σ (x - shift)²·y
    sum_dx2y: f64,
    max: Option<Extremum>,
    min: Option<Extremum>,
}

impl SignalStatistics {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all running sums back to the empty state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold one sample into the running sums.
    pub fn add(&mut self, x: f64, y: f64) {
        if self.n == 0 {
            self.shift = x;
        }
        let dx = x - self.shift;
        self.n += 1;
        self.sum_y += y;
        self.sum_y2 += y * y;
        self.sum_dxy += dx * y;
        self.sum_dx2y += dx * dx * y;

        // Strict comparisons keep the first occurrence on ties.
        match self.max {
            Some(m) if y <= m.y => {}
            _ => self.max = Some(Extremum { y, x }),
        }
        match self.min {
            Some(m) if y >= m.y => {}
            _ => self.min = Some(Extremum { y, x }),
        }
    }

    /// Number of samples since the last reset
    pub fn n(&self) -> usize {
        self.n
    }

    /// True when no sample has been added since the last reset
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Mean signal value, `sum_y / n`.
    pub fn mean_y(&self) -> StatsResult {
        if self.n == 0 {
            return Err(StatsError::insufficient("mean_y"));
        }
        Ok(self.sum_y / self.n as f64)
    }

    /// Population standard deviation of the signal.
    pub fn stddev_y(&self) -> StatsResult {
        let mean = self.mean_y().map_err(|_| StatsError::insufficient("stddev_y"))?;
        let variance = self.sum_y2 / self.n as f64 - mean * mean;
        // Mathematically non-negative; only rounding can push it below zero.
        Ok(variance.max(0.0).sqrt())
    }

    /// Signal-weighted mean position, `sum(x*y) / sum(y)`.
    ///
    /// # Errors
    /// `InsufficientData` when no samples were added or the total weight is
    /// zero.
    pub fn centroid(&self) -> StatsResult {
        if self.n == 0 || self.sum_y == 0.0 {
            return Err(StatsError::insufficient("centroid"));
        }
        Ok(self.shift + self.sum_dxy / self.sum_y)
    }

    /// Signal-weighted dispersion of position around the centroid.
    ///
    /// Computed as `E[d^2] - E[d]^2` over the shifted positions
    /// `d = x - shift`, which equals `sum((x - c)^2 * y) / sum(y)`.
    ///
    /// # Errors
    /// `InsufficientData` when the centroid is undefined, or when negative
    /// weights drive the variance below zero beyond rounding noise.
    pub fn sigma(&self) -> StatsResult {
        if self.n == 0 || self.sum_y == 0.0 {
            return Err(StatsError::insufficient("sigma"));
        }
        let offset = self.sum_dxy / self.sum_y;
        let second_moment = self.sum_dx2y / self.sum_y;
        let variance = second_moment - offset * offset;

        if variance >= 0.0 {
            return Ok(variance.sqrt());
        }
        let tolerance = 16.0 * f64::EPSILON * second_moment.abs();
        if variance >= -tolerance {
            Ok(0.0)
        } else {
            Err(StatsError::insufficient("sigma"))
        }
    }

    /// Largest signal value seen
    pub fn max_y(&self) -> StatsResult {
        self.max
            .map(|m| m.y)
            .ok_or_else(|| StatsError::insufficient("max_y"))
    }

    /// Smallest signal value seen
    pub fn min_y(&self) -> StatsResult {
        self.min
            .map(|m| m.y)
            .ok_or_else(|| StatsError::insufficient("min_y"))
    }

    /// Position of the first sample that reached `max_y`
    pub fn x_at_max_y(&self) -> StatsResult {
        self.max
            .map(|m| m.x)
            .ok_or_else(|| StatsError::insufficient("x_at_max_y"))
    }

    /// Position of the first sample that reached `min_y`
    pub fn x_at_min_y(&self) -> StatsResult {
        self.min
            .map(|m| m.x)
            .ok_or_else(|| StatsError::insufficient("x_at_min_y"))
    }
}
