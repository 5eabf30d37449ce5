//! Scan execution and the alignment loop built on top of it.
//!
//! - [`document`]: the Start/Descriptor/Event/Stop stream scans emit
//! - [`scan`]: the relative step scan engine
//! - [`align`]: the adaptive recentering controller

pub mod align;
pub mod document;
pub mod scan;

pub use align::{AlignPass, AlignRequest, AlignmentConfig, AlignmentController, Feature, PassOutcome};
pub use document::{Document, DocumentLog, DocumentSink};
pub use scan::{ScanEngine, ScanRequest, StepScanEngine};
