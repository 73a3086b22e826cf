//! Rolls sensor readings up into an asset's `computedHealth`.
//!
//! Every observation slot of every sensor observing the asset is divided by
//! the upper limit of its category; the asset's health is the largest of
//! those fractions as a percentage. Values above 100 are kept as-is.

use std::fmt;

use crate::client::TwinGraph;
use crate::error::TwinError;
use crate::patch::PatchDocument;
use crate::twin::{first_by_id, query, AssetNode, HealthValue, SensorNode, COMPUTED_HEALTH};
use crate::updater::UpdateOutcome;

/// Severity band of a computed health value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Normal,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_health(health: f64) -> Self {
        if health > 100.0 {
            HealthStatus::Critical
        } else if health > 80.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Normal
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Normal => "normal",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        })
    }
}

/// Largest normalized reading across all sensors, as a fraction.
///
/// Absent slots count as 0 and unknown sensor types contribute nothing.
pub fn max_normalized(sensors: &[SensorNode]) -> f64 {
    sensors
        .iter()
        .flat_map(|sensor| {
            sensor
                .sensor_type
                .slot_categories()
                .iter()
                .enumerate()
                .map(move |(slot, category)| {
                    category.normalize(sensor.observation(slot).unwrap_or(0.0))
                })
        })
        .fold(0.0, f64::max)
}

/// `computedHealth` for an asset observed by `sensors`.
pub fn compute_health(sensors: &[SensorNode]) -> f64 {
    max_normalized(sensors) * 100.0
}

/// Recompute and store the health of `asset_id`.
///
/// Store faults are reported through [`UpdateOutcome::Failed`]; this never
/// returns an error.
pub async fn recompute_health<G>(graph: &G, sensor_model: &str, asset_id: &str) -> UpdateOutcome
where
    G: TwinGraph + ?Sized,
{
    match try_recompute(graph, sensor_model, asset_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("failed to recompute health for {}: {}", asset_id, e);
            UpdateOutcome::Failed(e)
        }
    }
}

async fn try_recompute<G>(
    graph: &G,
    sensor_model: &str,
    asset_id: &str,
) -> Result<UpdateOutcome, TwinError>
where
    G: TwinGraph + ?Sized,
{
    let sensors: Vec<SensorNode> = graph
        .query(&query::sensors_observing(sensor_model, asset_id))
        .await?
        .into_iter()
        .map(SensorNode::from)
        .collect();
    let health = compute_health(&sensors);

    let Some(asset) = first_by_id(graph.query(&query::twin_by_id(asset_id)).await?)
        .map(AssetNode::from)
    else {
        log::warn!("asset twin {} not found, health {} not stored", asset_id, health);
        return Ok(UpdateOutcome::Unchanged);
    };

    let mut patch = PatchDocument::new();
    match asset.computed_health {
        Some(HealthValue::Number(existing)) if existing == health => {
            return Ok(UpdateOutcome::Unchanged);
        }
        Some(_) => patch.replace(COMPUTED_HEALTH, health),
        None => patch.add(COMPUTED_HEALTH, health),
    }

    let status = HealthStatus::from_health(health);
    match status {
        HealthStatus::Critical => log::warn!(
            "computed health for {}: {} ({}, {} sensors)",
            asset.dt_id,
            health,
            status,
            sensors.len()
        ),
        _ => log::info!(
            "computed health for {}: {} ({}, {} sensors)",
            asset.dt_id,
            health,
            status,
            sensors.len()
        ),
    }

    graph.patch(&asset.dt_id, &patch).await?;
    Ok(UpdateOutcome::Patched { ops: patch.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twin::SensorType;
    use std::collections::HashSet;

    fn sensor(sensor_type: SensorType, v1: Option<f64>, v2: Option<f64>) -> SensorNode {
        SensorNode {
            dt_id: "s".into(),
            device_id: None,
            observes: Some("asset".into()),
            sensor_type,
            observation_value1: v1,
            observation_value2: v2,
            populated: HashSet::new(),
        }
    }

    #[test]
    fn air_sensor_normalizes_co() {
        let health = compute_health(&[sensor(SensorType::BaselineAirSensor, Some(3.6), Some(0.0))]);
        assert!((health - 80.0).abs() < 1e-9);
    }

    #[test]
    fn takes_the_max_across_siblings() {
        let health = compute_health(&[
            sensor(SensorType::InteriorThermometer, Some(30.0), None),
            sensor(SensorType::BridgeSensor, Some(1.2), Some(0.27)),
        ]);
        assert!((health - 90.0).abs() < 1e-9);
    }

    #[test]
    fn second_slot_counts() {
        let health = compute_health(&[sensor(SensorType::VehicleCounter, Some(80.0), Some(80.0))]);
        assert!((health - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_types_and_missing_values_contribute_zero() {
        assert_eq!(
            compute_health(&[
                sensor(SensorType::Unknown("Rain Gauge".into()), Some(1e6), Some(1e6)),
                sensor(SensorType::TunnelAirSensor, None, None),
            ]),
            0.0
        );
        assert_eq!(compute_health(&[]), 0.0);
    }

    #[test]
    fn not_clamped_above_limit() {
        let health = compute_health(&[sensor(SensorType::ExteriorThermometer, Some(150.0), None)]);
        assert_eq!(health, 150.0);
        assert_eq!(HealthStatus::from_health(health), HealthStatus::Critical);
    }

    #[test]
    fn status_bands() {
        assert_eq!(HealthStatus::from_health(0.0), HealthStatus::Normal);
        assert_eq!(HealthStatus::from_health(80.0), HealthStatus::Normal);
        assert_eq!(HealthStatus::from_health(80.5), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_health(100.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_health(100.1), HealthStatus::Critical);
    }
}
