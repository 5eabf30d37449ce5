//! # DAQ Align
//!
//! Adaptive peak alignment for step scans. A positioner is scanned across a
//! window, per-signal statistics are accumulated online from the scan's
//! document stream, and if the principal detector shows a credible peak the
//! positioner is moved onto it and the next window is narrowed to the peak's
//! width.
//!
//! ## Crate Structure
//!
//! - **`analysis`**: `SignalStatistics` (weighted moments), the
//!   `ScanStatisticsCollector` document-stream state machine, and the peak
//!   classifier (`strong_peak`, `too_wide`).
//! - **`experiment`**: scan documents, the `ScanEngine` seam with a
//!   registry-backed `StepScanEngine`, and the `AlignmentController`.
//! - **`hardware`**: `Movable`/`Readable` capabilities, the `DeviceRegistry`,
//!   and simulated devices.
//! - **`config`**: Figment-layered configuration (`config/align.toml` plus
//!   `DAQ_ALIGN_` environment overrides).
//! - **`tracing_setup`**: subscriber initialization.
//! - **`error`**: `StatsError`, `AlignError`, `ConfigError`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use daq_align::experiment::{AlignRequest, AlignmentController, StepScanEngine};
//! use daq_align::hardware::mock::{GaussianDetector, MockStage};
//! use daq_align::hardware::DeviceRegistry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stage = Arc::new(MockStage::new());
//! let mut registry = DeviceRegistry::new();
//! registry.register_movable("sample_x", stage.clone(), "mm")?;
//! registry.register_readable(
//!     "diode",
//!     Arc::new(GaussianDetector::new(stage.clone(), 0.3, 0.05, 1000.0)),
//!     "counts",
//! )?;
//!
//! let engine = Arc::new(StepScanEngine::new(Arc::new(registry)));
//! let mut controller = AlignmentController::new(engine);
//! controller
//!     .align(&AlignRequest::new(&["diode"], "sample_x", -1.0, 1.0, 41).with_feature("cen"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod tracing_setup;
