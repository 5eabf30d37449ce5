//! Mock Hardware Implementations
//!
//! Simulated devices for testing and demos without physical hardware.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockStage` - Simulated motion stage, instant by default or speed-limited
//! - `GaussianDetector` - Readable whose signal is a Gaussian peak in the
//!   position of a linked `Movable`

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::trace;

use crate::hardware::capabilities::{Movable, Readable};

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

/// Mock motion stage
///
/// Moves are instantaneous unless a speed is configured, in which case the
/// move sleeps for `distance / speed`.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::with_position(0.5);
/// stage.move_abs(1.5).await?;
/// assert_eq!(stage.position().await?, 1.5);
/// ```
#[derive(Debug)]
pub struct MockStage {
    position: Arc<RwLock<f64>>,
    speed_mm_per_sec: Option<f64>,
    moves: std::sync::atomic::AtomicUsize,
}

impl MockStage {
    /// Create new mock stage at position 0.0mm
    pub fn new() -> Self {
        Self::with_position(0.0)
    }

    /// Create new mock stage at specified initial position
    pub fn with_position(initial_position: f64) -> Self {
        Self {
            position: Arc::new(RwLock::new(initial_position)),
            speed_mm_per_sec: None,
            moves: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Limit motion speed (mm/sec); moves then take real time
    pub fn with_speed(mut self, speed_mm_per_sec: f64) -> Self {
        self.speed_mm_per_sec = Some(speed_mm_per_sec);
        self
    }

    /// Number of absolute moves commanded so far
    pub fn move_count(&self) -> usize {
        self.moves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        if !target.is_finite() {
            anyhow::bail!("MockStage: refusing non-finite target {}", target);
        }
        let current = *self.position.read().await;

        if let Some(speed) = self.speed_mm_per_sec {
            let delay_ms = ((target - current).abs() / speed * 1000.0) as u64;
            // CRITICAL: Use tokio::time::sleep, NOT std::thread::sleep
            sleep(Duration::from_millis(delay_ms)).await;
        }

        *self.position.write().await = target;
        self.moves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        trace!(from = current, to = target, "MockStage moved");
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }

    async fn wait_settled(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// GaussianDetector - Simulated peak signal
// =============================================================================

/// Detector whose reading is a Gaussian peak in the position of a stage
///
/// `signal = background + amplitude * exp(-(x - center)^2 / (2 * width^2))`
/// plus optional uniform noise in `[-noise, noise]`.
pub struct GaussianDetector {
    axis: Arc<dyn Movable>,
    center: f64,
    width: f64,
    amplitude: f64,
    background: f64,
    noise: f64,
}

impl GaussianDetector {
    /// Peak of `amplitude` at `center` with standard deviation `width`
    pub fn new(axis: Arc<dyn Movable>, center: f64, width: f64, amplitude: f64) -> Self {
        Self {
            axis,
            center,
            width,
            amplitude,
            background: 0.0,
            noise: 0.0,
        }
    }

    /// Constant offset added to every reading
    pub fn with_background(mut self, background: f64) -> Self {
        self.background = background;
        self
    }

    /// Uniform noise half-width added to every reading
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Noise-free signal at a position
    pub fn signal_at(&self, x: f64) -> f64 {
        let d = x - self.center;
        self.background + self.amplitude * (-(d * d) / (2.0 * self.width * self.width)).exp()
    }
}

#[async_trait]
impl Readable for GaussianDetector {
    async fn read(&self) -> Result<f64> {
        let x = self.axis.position().await?;
        let mut value = self.signal_at(x);
        if self.noise > 0.0 {
            value += rand::thread_rng().gen_range(-self.noise..=self.noise);
        }
        Ok(value)
    }
}
