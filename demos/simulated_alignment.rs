//! Align a simulated stage onto a simulated peak.
//!
//! Loads `config/align.toml` (defaults if absent), starts tracing, and runs
//! the alignment loop against a noisy Gaussian detector.
//!
//! Run with:
//! ```bash
//! cargo run --example simulated_alignment
//! DAQ_ALIGN_ALIGNMENT__FEATURE=cen cargo run --example simulated_alignment
//! ```

use std::sync::Arc;

use daq_align::config::AlignConfig;
use daq_align::experiment::{AlignRequest, AlignmentController, PassOutcome, StepScanEngine};
use daq_align::hardware::mock::{GaussianDetector, MockStage};
use daq_align::hardware::{DeviceRegistry, Movable};
use daq_align::tracing_setup;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AlignConfig::load()?;
    config.validate()?;
    tracing_setup::init_from_config(&config)?;

    println!("=== Simulated Alignment ===\n");
    println!("Feature: {}", config.alignment.feature);
    println!("Passes:  {}\n", config.alignment.nscans);

    let stage = Arc::new(MockStage::with_position(0.1).with_speed(200.0));
    let diode = GaussianDetector::new(stage.clone(), 1.1, 0.1, 1000.0)
        .with_background(2.0)
        .with_noise(1.0);

    let mut registry = DeviceRegistry::new();
    registry.register_movable("sample_x", stage.clone(), "mm")?;
    registry.register_readable("diode", Arc::new(diode), "counts")?;

    let engine = Arc::new(StepScanEngine::new(Arc::new(registry)));
    let mut controller = AlignmentController::from_config(engine, &config);

    let request = AlignRequest::new(&["diode"], "sample_x", -2.0, 4.0, 21)
        .with_config(&config.alignment);
    controller.align(&request).await?;

    for pass in controller.passes() {
        let verdict = match pass.outcome {
            PassOutcome::Moved { target } => format!("moved to {:.4}", target),
            other => format!("{:?}", other),
        };
        println!(
            "pass {}: window [{:+.4}, {:+.4}] -> {}",
            pass.iteration, pass.rel_start, pass.rel_end, verdict
        );
    }
    if let Some(report) = controller.collector().last_report() {
        println!("\n{}", report);
    }
    println!("\nFinal position: {:.4} mm", stage.position().await?);

    Ok(())
}
