//! Scan document model
//!
//! A scanning engine narrates every scan as a fixed sequence of documents:
//!
//! ```text
//! StartDoc (1)            detectors + motors taking part
//!    │
//!    ├── DescriptorDoc (1+, one per data stream, hints per device)
//!    │       │
//!    │       └── EventDoc (N, one per scan point)
//!    │
//! StopDoc (1, only on normal completion)
//! ```
//!
//! Consumers subscribe through [`DocumentSink`] and are called synchronously,
//! in-line, once per document. The engine guarantees the order above; a
//! sink is free to drop anything that does not fit it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stream name carrying the per-point readings of a scan
pub const PRIMARY_STREAM: &str = "primary";

/// Generate a new unique document ID
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Current timestamp in nanoseconds since Unix epoch
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Document variants emitted during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    /// Scan start - declares detectors and motors
    Start(StartDoc),
    /// Data stream descriptor - declares fields per device
    Descriptor(DescriptorDoc),
    /// One scan point
    Event(EventDoc),
    /// Normal completion of the scan
    Stop(StopDoc),
}

impl Document {
    /// Get the run UID this document belongs to
    pub fn run_uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid, // Start doc UID is the run UID
            Document::Descriptor(d) => &d.run_uid,
            Document::Event(d) => &d.run_uid,
            Document::Stop(d) => &d.run_uid,
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Start(_) => "start",
            Document::Descriptor(_) => "descriptor",
            Document::Event(_) => "event",
            Document::Stop(_) => "stop",
        }
    }
}

/// Consumer of a document stream.
///
/// Called in-line by the scanning engine; each document is fully handled
/// before the next one is delivered.
pub trait DocumentSink: Send {
    /// Handle one document
    fn receive(&mut self, doc: &Document);
}

/// Collects every document it receives. Useful for inspecting a scan.
#[derive(Debug, Default)]
pub struct DocumentLog {
    /// Documents in arrival order
    pub documents: Vec<Document>,
}

impl DocumentSink for DocumentLog {
    fn receive(&mut self, doc: &Document) {
        self.documents.push(doc.clone());
    }
}

/// Forwards each document to two sinks, first `.0` then `.1`.
pub struct Tee<'a>(pub &'a mut dyn DocumentSink, pub &'a mut dyn DocumentSink);

impl DocumentSink for Tee<'_> {
    fn receive(&mut self, doc: &Document) {
        self.0.receive(doc);
        self.1.receive(doc);
    }
}

/// Start document - emitted once at the beginning of a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique run identifier (this IS the run_uid)
    pub uid: String,
    /// Plan that generated this run (e.g. "rel_scan")
    pub plan_name: String,
    /// Detector device IDs, principal detector first
    pub detectors: Vec<String>,
    /// Positioner device IDs
    pub motors: Vec<String>,
    /// Plan arguments for provenance
    pub plan_args: HashMap<String, String>,
    /// Timestamp when run started
    pub time_ns: u64,
}

impl StartDoc {
    /// Create a start document for a new run
    pub fn new(plan_name: &str) -> Self {
        Self {
            uid: new_uid(),
            plan_name: plan_name.to_string(),
            detectors: Vec::new(),
            motors: Vec::new(),
            plan_args: HashMap::new(),
            time_ns: now_ns(),
        }
    }

    /// Declare a detector
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detectors.push(detector.to_string());
        self
    }

    /// Declare a motor
    pub fn with_motor(mut self, motor: &str) -> Self {
        self.motors.push(motor.to_string());
        self
    }

    /// Record a plan argument
    pub fn with_arg(mut self, key: &str, value: &str) -> Self {
        self.plan_args.insert(key.to_string(), value.to_string());
        self
    }
}

/// Descriptor document - declares the fields of one data stream
///
/// `hints` lists, per device, the fields worth looking at (plotting,
/// statistics). A device may expose several fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorDoc {
    /// Unique descriptor ID
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Stream name (e.g., "primary", "baseline")
    pub name: String,
    /// Hinted fields per device
    pub hints: HashMap<String, Vec<String>>,
    /// Schema for data fields
    pub data_keys: HashMap<String, DataKey>,
    /// Timestamp
    pub time_ns: u64,
}

impl DescriptorDoc {
    /// Create a descriptor for a stream of the given run
    pub fn new(run_uid: &str, name: &str) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            name: name.to_string(),
            hints: HashMap::new(),
            data_keys: HashMap::new(),
            time_ns: now_ns(),
        }
    }

    /// Add a hinted field for a device
    pub fn with_hint(mut self, device: &str, field: &str) -> Self {
        self.hints
            .entry(device.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Add a data key
    pub fn with_data_key(mut self, name: &str, key: DataKey) -> Self {
        self.data_keys.insert(name.to_string(), key);
        self
    }

    /// Hinted fields of a device, empty if it has none
    pub fn hinted_fields(&self, device: &str) -> &[String] {
        self.hints.get(device).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Schema for a data field within events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataKey {
    /// Data type: "number", "integer", "string", "array"
    pub dtype: String,
    /// Source device ID
    pub source: String,
    /// Physical units
    pub units: String,
}

impl DataKey {
    /// Create a scalar number data key
    pub fn scalar(source: &str, units: &str) -> Self {
        Self {
            dtype: "number".to_string(),
            source: source.to_string(),
            units: units.to_string(),
        }
    }
}

/// Event document - readings for one scan point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDoc {
    /// Unique event ID
    pub uid: String,
    /// Links to StartDoc (for quick run lookup)
    pub run_uid: String,
    /// Links to DescriptorDoc that defines schema
    pub descriptor_uid: String,
    /// Event sequence number within this descriptor stream
    pub seq_num: u32,
    /// Timestamp
    pub time_ns: u64,
    /// Scalar data values (field name -> value)
    pub data: HashMap<String, f64>,
}

impl EventDoc {
    /// Create an empty event for a descriptor
    pub fn new(run_uid: &str, descriptor_uid: &str, seq_num: u32) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            descriptor_uid: descriptor_uid.to_string(),
            seq_num,
            time_ns: now_ns(),
            data: HashMap::new(),
        }
    }

    /// Add a reading
    pub fn with_datum(mut self, field: &str, value: f64) -> Self {
        self.data.insert(field.to_string(), value);
        self
    }
}

/// Stop document - emitted once when a scan completes normally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDoc {
    /// Unique stop doc ID
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Exit status: "success"
    pub exit_status: String,
    /// Timestamp when run ended
    pub time_ns: u64,
    /// Total events emitted
    pub num_events: u32,
}

impl StopDoc {
    /// Stop document for a successfully completed run
    pub fn success(run_uid: &str, num_events: u32) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            exit_status: "success".to_string(),
            time_ns: now_ns(),
            num_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_doc_builder() {
        let doc = StartDoc::new("rel_scan")
            .with_detector("diode")
            .with_detector("i0")
            .with_motor("sample_x")
            .with_arg("points", "21");

        assert_eq!(doc.plan_name, "rel_scan");
        assert_eq!(doc.detectors, vec!["diode", "i0"]);
        assert_eq!(doc.motors, vec!["sample_x"]);
        assert_eq!(doc.plan_args.get("points"), Some(&"21".to_string()));
    }

    #[test]
    fn test_descriptor_hints() {
        let run_uid = new_uid();
        let desc = DescriptorDoc::new(&run_uid, PRIMARY_STREAM)
            .with_hint("diode", "diode")
            .with_hint("quad", "quad_sum")
            .with_hint("quad", "quad_diff")
            .with_data_key("diode", DataKey::scalar("diode", "counts"));

        assert_eq!(desc.name, "primary");
        assert_eq!(desc.hinted_fields("quad"), ["quad_sum", "quad_diff"]);
        assert!(desc.hinted_fields("missing").is_empty());
        assert!(desc.data_keys.contains_key("diode"));
    }

    #[test]
    fn test_document_enum() {
        let start = StartDoc::new("rel_scan");
        let run_uid = start.uid.clone();
        let event = EventDoc::new(&run_uid, &new_uid(), 0).with_datum("diode", 4.2);

        assert_eq!(Document::Start(start).run_uid(), run_uid);
        let event = Document::Event(event);
        assert_eq!(event.run_uid(), run_uid);
        assert_eq!(event.kind(), "event");
    }

    #[test]
    fn test_document_serialization_is_tagged() {
        let stop = Document::Stop(StopDoc::success("run-1", 3));
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["type"], "stop");
        assert_eq!(json["num_events"], 3);
    }

    #[test]
    fn test_tee_forwards_to_both() {
        let mut a = DocumentLog::default();
        let mut b = DocumentLog::default();
        {
            let mut tee = Tee(&mut a, &mut b);
            tee.receive(&Document::Stop(StopDoc::success("run-1", 0)));
        }
        assert_eq!(a.documents.len(), 1);
        assert_eq!(b.documents.len(), 1);
    }
}
