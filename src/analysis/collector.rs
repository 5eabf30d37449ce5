//! Per-scan statistics collector
//!
//! `ScanStatisticsCollector` subscribes to a scan's document stream and keeps
//! one [`SignalStatistics`] per hinted detector field, with the positioner's
//! field as `x`.
//!
//! # State Machine
//!
//! ```text
//!            Start
//! ┌──────┐ ─────────▶ ┌────────┐ ──┐ Start (nested: reset, start fresh)
//! │ Idle │            │ Active │ ◀─┘
//! └──────┘ ◀───────── └────────┘    Descriptor (configured stream) binds fields
//!            Stop                   Event (bound descriptor) folds samples
//! ```
//!
//! Documents that do not fit the current state are dropped, never raised:
//! events from other streams are normal, and a scan-start while active means
//! the previous scan was abandoned without a stop.
//!
//! The session that just finished is kept (read-only) until the next
//! scan-start, so callers can read the statistics after the scan returns.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::peak::{PeakAssessment, XExtent};
use crate::analysis::statistics::SignalStatistics;
use crate::experiment::document::{
    DescriptorDoc, Document, DocumentSink, EventDoc, StartDoc, PRIMARY_STREAM,
};

/// Collector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Only descriptors of this stream are bound
    pub stream_name: String,
    /// Emit a report automatically at scan-stop
    pub auto_report: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            stream_name: PRIMARY_STREAM.to_string(),
            auto_report: true,
        }
    }
}

/// Whether a scan is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Waiting for a scan-start
    Idle,
    /// Inside a scan
    Active,
}

/// One bound `y` field
#[derive(Debug, Clone)]
pub struct BoundSignal {
    /// Event field name
    pub field: String,
    /// Running statistics for this field
    pub stats: SignalStatistics,
}

/// Fields bound from the descriptor of the configured stream
#[derive(Debug, Clone)]
struct StreamBinding {
    descriptor_uid: String,
    x_field: String,
    signals: Vec<BoundSignal>,
    x_extent: Option<XExtent>,
}

/// State of one scan, from scan-start until the next scan-start
#[derive(Debug, Clone)]
pub struct ScanSession {
    run_uid: String,
    detectors: Vec<String>,
    motors: Vec<String>,
    binding: Option<StreamBinding>,
    suppress_report: bool,
}

impl ScanSession {
    fn new(start: &StartDoc) -> Self {
        Self {
            run_uid: start.uid.clone(),
            detectors: start.detectors.clone(),
            motors: start.motors.clone(),
            binding: None,
            suppress_report: false,
        }
    }

    /// Run UID of the scan
    pub fn run_uid(&self) -> &str {
        &self.run_uid
    }

    /// Field used as `x`, once the descriptor is bound
    pub fn x_field(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.x_field.as_str())
    }

    /// Bound signals in binding order (principal first)
    pub fn signals(&self) -> &[BoundSignal] {
        self.binding
            .as_ref()
            .map(|b| b.signals.as_slice())
            .unwrap_or(&[])
    }

    /// Observed range of `x`
    pub fn x_extent(&self) -> Option<XExtent> {
        self.binding.as_ref().and_then(|b| b.x_extent)
    }

    /// Statistics and x range of one field
    pub fn assessment(&self, field: &str) -> Option<PeakAssessment<'_>> {
        let binding = self.binding.as_ref()?;
        binding
            .signals
            .iter()
            .find(|s| s.field == field)
            .map(|s| PeakAssessment {
                stats: &s.stats,
                x_extent: binding.x_extent,
            })
    }

    /// Statistics and x range of the first bound field
    pub fn principal(&self) -> Option<PeakAssessment<'_>> {
        let binding = self.binding.as_ref()?;
        binding.signals.first().map(|s| PeakAssessment {
            stats: &s.stats,
            x_extent: binding.x_extent,
        })
    }

    fn bind(&mut self, descriptor: &DescriptorDoc) {
        let Some(motor) = self.motors.first() else {
            warn!(run_uid = %self.run_uid, "Scan declared no motor; statistics disabled");
            return;
        };
        let x_field = descriptor
            .hinted_fields(motor)
            .first()
            .cloned()
            .unwrap_or_else(|| motor.clone());

        let signals: Vec<BoundSignal> = self
            .detectors
            .iter()
            .flat_map(|det| descriptor.hinted_fields(det).iter())
            .map(|field| BoundSignal {
                field: field.clone(),
                stats: SignalStatistics::new(),
            })
            .collect();

        info!(
            run_uid = %self.run_uid,
            x_field = %x_field,
            signals = ?signals.iter().map(|s| s.field.as_str()).collect::<Vec<_>>(),
            "Bound stream fields"
        );

        self.binding = Some(StreamBinding {
            descriptor_uid: descriptor.uid.clone(),
            x_field,
            signals,
            x_extent: None,
        });
    }

    fn fold(&mut self, event: &EventDoc) {
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        if event.descriptor_uid != binding.descriptor_uid {
            debug!(descriptor = %event.descriptor_uid, "Dropping event from unbound stream");
            return;
        }
        let Some(&x) = event.data.get(&binding.x_field) else {
            debug!(seq_num = event.seq_num, field = %binding.x_field, "Event has no x value");
            return;
        };

        binding.x_extent = Some(match binding.x_extent {
            Some(mut extent) => {
                extent.include(x);
                extent
            }
            None => XExtent::at(x),
        });
        for signal in &mut binding.signals {
            match event.data.get(&signal.field) {
                Some(&y) => signal.stats.add(x, y),
                None => debug!(seq_num = event.seq_num, field = %signal.field, "Event missing signal"),
            }
        }
    }
}

/// Demultiplexes a document stream into per-signal statistics.
#[derive(Debug, Default)]
pub struct ScanStatisticsCollector {
    config: CollectorConfig,
    active: Option<ScanSession>,
    finished: Option<ScanSession>,
    suppress_report: bool,
    last_report: Option<StatsReport>,
}

impl ScanStatisticsCollector {
    /// Create a collector with the given settings
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Current state
    pub fn state(&self) -> CollectorState {
        if self.active.is_some() {
            CollectorState::Active
        } else {
            CollectorState::Idle
        }
    }

    /// Skip the automatic report at the stop of the next session.
    ///
    /// The request attaches to the session opened by the next scan-start and
    /// is discarded with it if that scan never stops.
    pub fn suppress_next_report(&mut self) {
        self.suppress_report = true;
    }

    /// The active session, or else the one that finished last
    pub fn session(&self) -> Option<&ScanSession> {
        self.active.as_ref().or(self.finished.as_ref())
    }

    /// Statistics of the principal (first bound) signal
    pub fn principal(&self) -> Option<PeakAssessment<'_>> {
        self.session().and_then(ScanSession::principal)
    }

    /// Statistics of a named signal field
    pub fn signal(&self, field: &str) -> Option<&SignalStatistics> {
        self.session()
            .and_then(|s| s.assessment(field))
            .map(|a| a.stats)
    }

    /// Single entry point for the document stream.
    pub fn receiver(&mut self, doc: &Document) {
        if let (Some(session), false) = (&self.active, matches!(doc, Document::Start(_))) {
            if doc.run_uid() != session.run_uid {
                debug!(
                    kind = doc.kind(),
                    run_uid = %doc.run_uid(),
                    active_run = %session.run_uid,
                    "Dropping document from another run"
                );
                return;
            }
        }
        match doc {
            Document::Start(start) => self.on_start(start),
            Document::Descriptor(descriptor) => self.on_descriptor(descriptor),
            Document::Event(event) => {
                if let Some(session) = self.active.as_mut() {
                    session.fold(event);
                }
            }
            Document::Stop(_) => self.on_stop(),
        }
    }

    fn on_start(&mut self, start: &StartDoc) {
        if let Some(stale) = self.active.take() {
            warn!(
                stale_run = %stale.run_uid,
                new_run = %start.uid,
                "Scan start while a scan is active; discarding stale session"
            );
        }
        self.finished = None;
        debug!(
            run_uid = %start.uid,
            detectors = ?start.detectors,
            motors = ?start.motors,
            "Scan started"
        );
        let mut session = ScanSession::new(start);
        session.suppress_report = std::mem::take(&mut self.suppress_report);
        self.active = Some(session);
    }

    fn on_descriptor(&mut self, descriptor: &DescriptorDoc) {
        let Some(session) = self.active.as_mut() else {
            return;
        };
        if descriptor.name != self.config.stream_name {
            debug!(stream = %descriptor.name, "Ignoring descriptor of other stream");
            return;
        }
        if session.binding.is_some() {
            debug!(descriptor = %descriptor.uid, "Stream already bound; ignoring descriptor");
            return;
        }
        session.bind(descriptor);
    }

    fn on_stop(&mut self) {
        let Some(session) = self.active.take() else {
            debug!("Scan stop while idle; ignoring");
            return;
        };
        debug!(run_uid = %session.run_uid, "Scan stopped");
        let suppressed = session.suppress_report;
        self.finished = Some(session);

        if self.config.auto_report && !suppressed {
            self.report();
        }
    }

    /// Build the statistics table, log it and keep it as the last report.
    pub fn report(&mut self) -> StatsReport {
        let report = self
            .session()
            .map(StatsReport::from_session)
            .unwrap_or_default();
        info!("Scan statistics\n{}", report);
        self.last_report = Some(report.clone());
        report
    }

    /// Most recently emitted report
    pub fn last_report(&self) -> Option<&StatsReport> {
        self.last_report.as_ref()
    }
}

impl DocumentSink for ScanStatisticsCollector {
    fn receive(&mut self, doc: &Document) {
        self.receiver(doc);
    }
}

/// One row of the statistics report. Undefined quantities are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    /// Signal field name
    pub field: String,
    /// Sample count
    pub n: usize,
    /// Weighted centroid
    pub centroid: Option<f64>,
    /// Weighted sigma
    pub sigma: Option<f64>,
    /// Position of the maximum
    pub x_at_max_y: Option<f64>,
    /// Maximum signal
    pub max_y: Option<f64>,
    /// Minimum signal
    pub min_y: Option<f64>,
    /// Mean signal
    pub mean_y: Option<f64>,
    /// Signal standard deviation
    pub stddev_y: Option<f64>,
}

impl StatsRow {
    fn new(field: &str, stats: &SignalStatistics) -> Self {
        Self {
            field: field.to_string(),
            n: stats.n(),
            centroid: stats.centroid().ok(),
            sigma: stats.sigma().ok(),
            x_at_max_y: stats.x_at_max_y().ok(),
            max_y: stats.max_y().ok(),
            min_y: stats.min_y().ok(),
            mean_y: stats.mean_y().ok(),
            stddev_y: stats.stddev_y().ok(),
        }
    }
}

/// Table of per-signal statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsReport {
    /// Run the statistics belong to
    pub run_uid: Option<String>,
    /// One row per bound signal, principal first
    pub rows: Vec<StatsRow>,
}

impl StatsReport {
    fn from_session(session: &ScanSession) -> Self {
        Self {
            run_uid: Some(session.run_uid.clone()),
            rows: session
                .signals()
                .iter()
                .map(|s| StatsRow::new(&s.field, &s.stats))
                .collect(),
        }
    }

    /// Row for a field
    pub fn row(&self, field: &str) -> Option<&StatsRow> {
        self.rows.iter().find(|r| r.field == field)
    }
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:>12.5}", v),
        None => format!("{:>12}", "-"),
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}{:>6}", "field", "n")?;
        for title in [
            "centroid",
            "sigma",
            "x_at_max_y",
            "max_y",
            "min_y",
            "mean_y",
            "stddev_y",
        ] {
            write!(f, "{:>12}", title)?;
        }
        for row in &self.rows {
            write!(f, "\n{:<16}{:>6}", row.field, row.n)?;
            for value in [
                row.centroid,
                row.sigma,
                row.x_at_max_y,
                row.max_y,
                row.min_y,
                row.mean_y,
                row.stddev_y,
            ] {
                f.write_str(&cell(value))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::document::{EventDoc, StopDoc};
    use tracing_test::traced_test;

    struct Scan {
        start: StartDoc,
        descriptor: DescriptorDoc,
    }

    impl Scan {
        fn new() -> Self {
            let start = StartDoc::new("rel_scan")
                .with_detector("diode")
                .with_detector("quad")
                .with_motor("sample_x");
            let descriptor = DescriptorDoc::new(&start.uid, PRIMARY_STREAM)
                .with_hint("sample_x", "sample_x_readback")
                .with_hint("diode", "diode")
                .with_hint("quad", "quad_sum")
                .with_hint("quad", "quad_diff");
            Self { start, descriptor }
        }

        fn event(&self, seq: u32, x: f64, diode: f64) -> Document {
            Document::Event(
                EventDoc::new(&self.start.uid, &self.descriptor.uid, seq)
                    .with_datum("sample_x_readback", x)
                    .with_datum("diode", diode)
                    .with_datum("quad_sum", 2.0 * diode)
                    .with_datum("quad_diff", 1.0),
            )
        }

        fn stop(&self) -> Document {
            Document::Stop(StopDoc::success(&self.start.uid, 0))
        }
    }

    fn run(collector: &mut ScanStatisticsCollector, scan: &Scan, points: &[(f64, f64)]) {
        collector.receiver(&Document::Start(scan.start.clone()));
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        for (i, &(x, y)) in points.iter().enumerate() {
            collector.receiver(&scan.event(i as u32, x, y));
        }
        collector.receiver(&scan.stop());
    }

    #[test]
    fn test_binds_hinted_fields_in_detector_order() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));
        assert_eq!(collector.state(), CollectorState::Active);
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));

        let session = collector.session().unwrap();
        assert_eq!(session.x_field(), Some("sample_x_readback"));
        let fields: Vec<&str> = session.signals().iter().map(|s| s.field.as_str()).collect();
        assert_eq!(fields, vec!["diode", "quad_sum", "quad_diff"]);
    }

    #[test]
    fn test_full_scan_accumulates_every_signal() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        run(&mut collector, &scan, &[(0.0, 1.0), (1.0, 3.0), (2.0, 1.0)]);

        assert_eq!(collector.state(), CollectorState::Idle);
        let diode = collector.signal("diode").unwrap();
        assert_eq!(diode.n(), 3);
        assert!((diode.centroid().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(collector.signal("quad_sum").unwrap().max_y().unwrap(), 6.0);

        let principal = collector.principal().unwrap();
        assert_eq!(principal.stats.n(), 3);
        assert_eq!(principal.x_extent, Some(XExtent { min: 0.0, max: 2.0 }));
    }

    #[test]
    fn test_motor_without_hints_uses_motor_name() {
        let mut collector = ScanStatisticsCollector::default();
        let start = StartDoc::new("rel_scan").with_detector("diode").with_motor("theta");
        let descriptor = DescriptorDoc::new(&start.uid, PRIMARY_STREAM).with_hint("diode", "diode");
        collector.receiver(&Document::Start(start.clone()));
        collector.receiver(&Document::Descriptor(descriptor.clone()));
        collector.receiver(&Document::Event(
            EventDoc::new(&start.uid, &descriptor.uid, 0)
                .with_datum("theta", 4.0)
                .with_datum("diode", 2.0),
        ));
        assert_eq!(collector.session().unwrap().x_field(), Some("theta"));
        assert_eq!(collector.signal("diode").unwrap().x_at_max_y().unwrap(), 4.0);
    }

    #[test]
    fn test_other_streams_and_unbound_events_are_dropped() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));

        // Event before its descriptor: unmatched
        collector.receiver(&scan.event(0, 0.0, 100.0));

        let baseline = DescriptorDoc::new(&scan.start.uid, "baseline").with_hint("diode", "diode");
        collector.receiver(&Document::Descriptor(baseline.clone()));
        assert!(collector.session().unwrap().x_field().is_none());

        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        collector.receiver(&Document::Event(
            EventDoc::new(&scan.start.uid, &baseline.uid, 0)
                .with_datum("sample_x_readback", 9.0)
                .with_datum("diode", 500.0),
        ));
        collector.receiver(&scan.event(1, 1.0, 2.0));

        let diode = collector.signal("diode").unwrap();
        assert_eq!(diode.n(), 1);
        assert_eq!(diode.max_y().unwrap(), 2.0);
    }

    #[test]
    fn test_documents_while_idle_are_ignored() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        collector.receiver(&scan.event(0, 0.0, 1.0));
        collector.receiver(&scan.stop());
        assert_eq!(collector.state(), CollectorState::Idle);
        assert!(collector.session().is_none());
        assert!(collector.last_report().is_none());
    }

    #[test]
    #[traced_test]
    fn test_nested_start_resets_session() {
        let mut collector = ScanStatisticsCollector::default();
        let first = Scan::new();
        collector.receiver(&Document::Start(first.start.clone()));
        collector.receiver(&Document::Descriptor(first.descriptor.clone()));
        collector.receiver(&first.event(0, 0.0, 50.0));
        // No stop: the scan was abandoned

        let second = Scan::new();
        run(&mut collector, &second, &[(5.0, 1.0), (6.0, 2.0)]);

        assert!(logs_contain("discarding stale session"));
        let session = collector.session().unwrap();
        assert_eq!(session.run_uid(), second.start.uid);
        assert_eq!(collector.signal("diode").unwrap().n(), 2);
        assert_eq!(collector.signal("diode").unwrap().max_y().unwrap(), 2.0);
    }

    #[test]
    fn test_event_missing_x_is_skipped() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        collector.receiver(&Document::Event(
            EventDoc::new(&scan.start.uid, &scan.descriptor.uid, 0).with_datum("diode", 7.0),
        ));
        assert!(collector.signal("diode").unwrap().is_empty());
        assert!(collector.principal().unwrap().x_extent.is_none());
    }

    #[test]
    fn test_auto_report_and_suppression() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();

        collector.suppress_next_report();
        run(&mut collector, &scan, &[(0.0, 1.0)]);
        assert!(collector.last_report().is_none());

        // Suppression applies to one session only
        let scan = Scan::new();
        run(&mut collector, &scan, &[(0.0, 1.0), (1.0, 4.0)]);
        let report = collector.last_report().unwrap();
        assert_eq!(report.run_uid.as_deref(), Some(scan.start.uid.as_str()));
        assert_eq!(report.row("diode").unwrap().n, 2);
    }

    #[test]
    fn test_suppression_dies_with_abandoned_session() {
        let mut collector = ScanStatisticsCollector::default();

        collector.suppress_next_report();
        let abandoned = Scan::new();
        collector.receiver(&Document::Start(abandoned.start.clone()));
        collector.receiver(&Document::Descriptor(abandoned.descriptor.clone()));
        collector.receiver(&abandoned.event(0, 0.0, 1.0));
        // No stop: the scan aborted

        let next = Scan::new();
        run(&mut collector, &next, &[(0.0, 1.0), (1.0, 4.0)]);
        let report = collector.last_report().unwrap();
        assert_eq!(report.run_uid.as_deref(), Some(next.start.uid.as_str()));
    }

    #[test]
    fn test_documents_from_another_run_are_dropped() {
        let mut collector = ScanStatisticsCollector::default();
        let scan = Scan::new();
        let other = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));

        collector.receiver(&Document::Descriptor(other.descriptor.clone()));
        assert!(collector.session().unwrap().x_field().is_none());

        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        collector.receiver(&scan.event(0, 0.0, 1.0));
        collector.receiver(&other.stop());
        assert_eq!(collector.state(), CollectorState::Active);

        collector.receiver(&scan.stop());
        assert_eq!(collector.state(), CollectorState::Idle);
        assert_eq!(collector.signal("diode").unwrap().n(), 1);
    }

    #[test]
    fn test_auto_report_disabled_by_config() {
        let mut collector = ScanStatisticsCollector::new(CollectorConfig {
            auto_report: false,
            ..Default::default()
        });
        run(&mut collector, &Scan::new(), &[(0.0, 1.0)]);
        assert!(collector.last_report().is_none());

        let report = collector.report();
        assert_eq!(report.rows.len(), 3);
        assert!(collector.last_report().is_some());
    }

    #[test]
    fn test_custom_stream_name() {
        let mut collector = ScanStatisticsCollector::new(CollectorConfig {
            stream_name: "fast".to_string(),
            ..Default::default()
        });
        let scan = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));
        assert!(collector.session().unwrap().x_field().is_none());

        let fast = DescriptorDoc::new(&scan.start.uid, "fast")
            .with_hint("sample_x", "sample_x")
            .with_hint("diode", "diode");
        collector.receiver(&Document::Descriptor(fast));
        assert_eq!(collector.session().unwrap().x_field(), Some("sample_x"));
    }

    #[test]
    fn test_report_table_renders_undefined_as_dash() {
        let mut collector = ScanStatisticsCollector::new(CollectorConfig {
            auto_report: false,
            ..Default::default()
        });
        let scan = Scan::new();
        collector.receiver(&Document::Start(scan.start.clone()));
        collector.receiver(&Document::Descriptor(scan.descriptor.clone()));

        let text = collector.report().to_string();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        for column in ["n", "centroid", "sigma", "x_at_max_y", "max_y", "min_y", "mean_y", "stddev_y"] {
            assert!(header.contains(column), "missing column {column}");
        }
        let diode = lines.next().unwrap();
        assert!(diode.starts_with("diode"));
        assert!(diode.contains('-'));
        assert!(!diode.contains("NaN"));
    }

    #[test]
    fn test_empty_report_without_session() {
        let mut collector = ScanStatisticsCollector::default();
        let report = collector.report();
        assert!(report.rows.is_empty());
        assert!(report.run_uid.is_none());
    }
}
