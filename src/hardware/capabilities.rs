//! Hardware capabilities used by alignment scans
//!
//! Devices are addressed by what they can do rather than what they are:
//!
//! - A stage or goniometer implements `Movable`
//! - A diode, ion chamber or power meter implements `Readable`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn peak_reading<M, R>(stage: &M, diode: &R, target: f64) -> Result<f64>
//! where
//!     M: Movable,
//!     R: Readable,
//! {
//!     stage.move_abs(target).await?;
//!     stage.wait_settled().await?;
//!     diode.read().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Motion Control
///
/// Devices that can move to positions (stages, actuators, goniometers).
///
/// # Contract
/// - Positions are in device-native units (typically mm or degrees)
/// - `move_abs` initiates motion but may return before completion
/// - `wait_settled` blocks until motion completes
/// - `position` returns current position (may be approximate during motion)
///
/// # Thread Safety
/// - All methods are async and require `&self` (immutable reference)
/// - Interior mutability (Mutex/RwLock) should be used for state
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    ///
    /// # Returns
    /// - Ok(()) if motion initiated successfully
    /// - Err if position is out of range or hardware error
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Get current position
    ///
    /// May be approximate if device is currently moving.
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// Should have internal timeout to prevent infinite blocking.
    async fn wait_settled(&self) -> Result<()>;
}

/// Capability: Scalar Readout
///
/// Devices that produce single scalar values (diodes, ion chambers, power
/// meters, counters).
///
/// # Contract
/// - `read()` performs measurement and returns value
/// - Units are device-specific (document in implementation)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}
