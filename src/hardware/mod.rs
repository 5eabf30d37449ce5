//! Hardware abstractions consumed by alignment scans.
//!
//! Only capabilities and simulated devices live here; real drivers plug in by
//! implementing [`capabilities::Movable`] and [`capabilities::Readable`].

pub mod capabilities;
pub mod mock;
pub mod registry;

pub use capabilities::{Movable, Readable};
pub use registry::DeviceRegistry;
