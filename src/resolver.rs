//! Maps inbound device identifiers to sensor twins.

use crate::client::TwinGraph;
use crate::error::TwinError;
use crate::twin::{first_by_id, query, SensorNode};

/// Drop the source qualifier from a composite device id.
///
/// Everything up to and including the first `.` is removed; later dots are
/// part of the id. Ids without a `.` are returned unchanged.
pub fn strip_device_prefix(raw: &str) -> &str {
    match raw.split_once('.') {
        Some((_, device)) => device,
        None => raw,
    }
}

/// Find the sensor twin that represents `raw_device_id`.
///
/// When several twins share the device id the one with the lowest dtId is
/// used.
pub async fn resolve_sensor_by_device<G>(
    graph: &G,
    sensor_model: &str,
    raw_device_id: &str,
) -> Result<SensorNode, TwinError>
where
    G: TwinGraph + ?Sized,
{
    let device_id = strip_device_prefix(raw_device_id);
    let matches = graph
        .query(&query::sensors_by_device(sensor_model, device_id))
        .await?;

    if matches.len() > 1 {
        log::warn!(
            "{} sensor twins share device id {}, using lowest dtId",
            matches.len(),
            device_id
        );
    }

    first_by_id(matches)
        .map(SensorNode::from)
        .ok_or_else(|| TwinError::NotFound(device_id.to_string()))
}
