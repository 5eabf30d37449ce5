//! Relative step scans
//!
//! [`ScanEngine`] is the seam between alignment logic and whatever actually
//! moves hardware. An engine performs one uniformly spaced relative scan and
//! narrates it to a [`DocumentSink`] in the canonical order
//! (Start → Descriptor → Event* → Stop). A failure aborts the scan without a
//! Stop document and is returned unchanged.
//!
//! [`StepScanEngine`] is the reference implementation over a
//! [`DeviceRegistry`]:
//!
//! ```text
//! origin = mover.position()
//! Start, Descriptor("primary")
//! for offset in linspace(rel_start, rel_end, points):
//!     MoveTo(origin + offset) → settle → read mover + detectors → Event
//! MoveTo(origin)
//! Stop
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::experiment::document::{
    DataKey, DescriptorDoc, Document, DocumentSink, EventDoc, StartDoc, StopDoc, PRIMARY_STREAM,
};
use crate::hardware::{DeviceRegistry, Movable, Readable};

/// Parameters of one relative scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Detector IDs, principal detector first
    pub detectors: Vec<String>,
    /// Positioner ID
    pub mover: String,
    /// Start offset relative to the current position
    pub rel_start: f64,
    /// End offset relative to the current position
    pub rel_end: f64,
    /// Number of points, evenly spaced, endpoints included
    pub points: usize,
}

impl ScanRequest {
    /// Offset of point `index`; a single-point scan sits at `rel_start`
    pub fn offset_at(&self, index: usize) -> f64 {
        if self.points <= 1 {
            self.rel_start
        } else {
            let step = (self.rel_end - self.rel_start) / (self.points - 1) as f64;
            self.rel_start + step * index as f64
        }
    }
}

/// Performs relative scans and reports them as documents
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Run one scan, delivering every document to `sink` in-line.
    ///
    /// Returns only after the scan completed (Stop delivered) or failed.
    async fn relative_scan(&self, request: &ScanRequest, sink: &mut dyn DocumentSink)
        -> Result<()>;

    /// Resolve a positioner by ID
    fn movable(&self, id: &str) -> Option<Arc<dyn Movable>>;
}

/// Step-and-read scan engine over a device registry
pub struct StepScanEngine {
    registry: Arc<DeviceRegistry>,
}

impl StepScanEngine {
    /// Create an engine over the given devices
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    fn resolve(&self, request: &ScanRequest) -> Result<(Arc<dyn Movable>, Vec<Arc<dyn Readable>>)> {
        let mover = self
            .registry
            .get_movable(&request.mover)
            .ok_or_else(|| anyhow!("Device '{}' not found or not movable", request.mover))?;
        let detectors = request
            .detectors
            .iter()
            .map(|id| {
                self.registry
                    .get_readable(id)
                    .ok_or_else(|| anyhow!("Device '{}' not found or not readable", id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((mover, detectors))
    }

    fn units(&self, id: &str) -> &str {
        self.registry.units(id).unwrap_or("")
    }
}

#[async_trait]
impl ScanEngine for StepScanEngine {
    async fn relative_scan(
        &self,
        request: &ScanRequest,
        sink: &mut dyn DocumentSink,
    ) -> Result<()> {
        if request.points == 0 {
            bail!("Scan needs at least one point");
        }
        let (mover, detectors) = self.resolve(request)?;
        let origin = mover
            .position()
            .await
            .with_context(|| format!("Reading start position of '{}'", request.mover))?;

        let mut start = StartDoc::new("rel_scan")
            .with_motor(&request.mover)
            .with_arg("rel_start", &request.rel_start.to_string())
            .with_arg("rel_end", &request.rel_end.to_string())
            .with_arg("points", &request.points.to_string());
        for det in &request.detectors {
            start = start.with_detector(det);
        }
        let run_uid = start.uid.clone();
        info!(
            run_uid = %run_uid,
            mover = %request.mover,
            origin,
            rel_start = request.rel_start,
            rel_end = request.rel_end,
            points = request.points,
            "Starting relative scan"
        );
        sink.receive(&Document::Start(start));

        let mut descriptor = DescriptorDoc::new(&run_uid, PRIMARY_STREAM)
            .with_hint(&request.mover, &request.mover)
            .with_data_key(
                &request.mover,
                DataKey::scalar(&request.mover, self.units(&request.mover)),
            );
        for det in &request.detectors {
            descriptor = descriptor
                .with_hint(det, det)
                .with_data_key(det, DataKey::scalar(det, self.units(det)));
        }
        let descriptor_uid = descriptor.uid.clone();
        sink.receive(&Document::Descriptor(descriptor));

        let mut num_events = 0u32;
        for index in 0..request.points {
            let setpoint = origin + request.offset_at(index);
            mover.move_abs(setpoint).await?;
            mover.wait_settled().await?;

            let mut data = HashMap::with_capacity(detectors.len() + 1);
            data.insert(request.mover.clone(), mover.position().await?);
            for (id, det) in request.detectors.iter().zip(&detectors) {
                let value = det
                    .read()
                    .await
                    .with_context(|| format!("Reading detector '{}'", id))?;
                data.insert(id.clone(), value);
            }

            let mut event = EventDoc::new(&run_uid, &descriptor_uid, num_events);
            event.data = data;
            debug!(seq_num = num_events, setpoint, "Scan point");
            sink.receive(&Document::Event(event));
            num_events += 1;
        }

        mover.move_abs(origin).await?;
        mover.wait_settled().await?;

        sink.receive(&Document::Stop(StopDoc::success(&run_uid, num_events)));
        info!(run_uid = %run_uid, num_events, "Relative scan complete");
        Ok(())
    }

    fn movable(&self, id: &str) -> Option<Arc<dyn Movable>> {
        self.registry.get_movable(id)
    }
}
