//! Online scan analysis: per-signal statistics, the document-stream
//! collector that feeds them, and the peak classifier that judges them.

pub mod collector;
pub mod peak;
pub mod statistics;

pub use collector::{CollectorConfig, CollectorState, ScanStatisticsCollector, StatsReport};
pub use peak::{strong_peak, too_wide, PeakAssessment, PeakCriteria, XExtent, FWHM_FROM_SIGMA};
pub use statistics::SignalStatistics;
