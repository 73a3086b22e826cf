//! Telemetry-to-twin health aggregation.
//!
//! Device telemetry updates the sensor twins of a digital twin graph; each
//! asset twin observed by those sensors carries a `computedHealth` derived
//! from the worst normalized reading among its sensors.

pub mod aggregator;
pub mod batch;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod patch;
pub mod resolver;
pub mod telemetry;
pub mod thresholds;
pub mod transport;
pub mod twin;
pub mod updater;

pub use batch::{BatchProcessor, BatchReport};
pub use client::{AdtConnector, Connect, TwinGraph};
pub use error::{BatchError, EventFailure, TwinError};
pub use telemetry::{InboundEvent, TelemetryEvent};
