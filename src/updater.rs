//! Writes inbound readings onto sensor twins.

use crate::client::TwinGraph;
use crate::error::TwinError;
use crate::patch::build_patch;
use crate::telemetry::{Reading, TelemetryEvent};
use crate::twin::{SensorNode, OBSERVATION_SLOTS};

/// Result of a best-effort write to the twin graph.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// A patch with `ops` operations was accepted.
    Patched { ops: usize },
    /// Nothing needed writing.
    Unchanged,
    /// The store rejected a read or write. Not propagated as an error so the
    /// caller decides what it means for the batch.
    Failed(TwinError),
}

impl UpdateOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, UpdateOutcome::Failed(_))
    }
}

/// Patch `sensor` with the values carried by `event`.
///
/// Payloads without a recognized field set leave the sensor untouched.
/// Partial field sets are reported as parse errors.
pub async fn apply_reading<G>(
    graph: &G,
    sensor: &SensorNode,
    event: &TelemetryEvent,
) -> Result<UpdateOutcome, TwinError>
where
    G: TwinGraph + ?Sized,
{
    let Some(reading) = Reading::from_payload(&event.payload)? else {
        log::debug!(
            "no recognized fields for sensor {} in {:?}",
            sensor.dt_id,
            event.payload.keys().collect::<Vec<_>>()
        );
        return Ok(UpdateOutcome::Unchanged);
    };

    let patch = build_patch(
        &sensor.populated,
        reading
            .slots()
            .map(|(slot, value)| (OBSERVATION_SLOTS[slot], value)),
    );
    if patch.is_empty() {
        return Ok(UpdateOutcome::Unchanged);
    }

    match graph.patch(&sensor.dt_id, &patch).await {
        Ok(()) => {
            log::debug!("patched sensor {} with {} ops", sensor.dt_id, patch.len());
            Ok(UpdateOutcome::Patched { ops: patch.len() })
        }
        Err(e) => {
            log::warn!("failed to patch sensor {}: {}", sensor.dt_id, e);
            Ok(UpdateOutcome::Failed(e))
        }
    }
}
