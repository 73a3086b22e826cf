//! Twin node snapshots and the query sublanguage used to find them.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::error::TwinError;
use crate::thresholds::Category;

/// Observation slots on a sensor twin, in slot order.
pub const OBSERVATION_SLOTS: [&str; 2] = ["observationValue1", "observationValue2"];

pub const COMPUTED_HEALTH: &str = "computedHealth";

/// Default model id of sensor twins.
pub const DEFAULT_SENSOR_MODEL: &str = "dtmi:adt:chb:Sensor;1";

/// A node as returned by a twin query: identity plus its properties.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Twin {
    #[serde(rename = "$dtId")]
    pub dt_id: String,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Twin {
    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Finite numeric property, accepting JSON numbers and numeric strings.
    pub fn number(&self, name: &str) -> Option<f64> {
        let n = match self.properties.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        n.filter(|n: &f64| n.is_finite())
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.properties.get(name)?.as_str()
    }

    /// Names of properties that currently hold a value.
    pub fn populated(&self) -> HashSet<String> {
        self.properties
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Sensor kind, from the twin's `type` label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorType {
    InteriorThermometer,
    ExteriorThermometer,
    BaselineAirSensor,
    TunnelAirSensor,
    VehicleCounter,
    BridgeSensor,
    Unknown(String),
}

/// Label and slot categories for every known sensor type.
const SENSOR_TYPES: &[(SensorType, &str, &[Category])] = &[
    (
        SensorType::InteriorThermometer,
        "Interior Thermometer",
        &[Category::Temperature],
    ),
    (
        SensorType::ExteriorThermometer,
        "Exterior Thermometer",
        &[Category::Temperature],
    ),
    (
        SensorType::BaselineAirSensor,
        "Baseline Air Sensor",
        &[Category::Co, Category::No2],
    ),
    (
        SensorType::TunnelAirSensor,
        "Tunnel Air Sensor",
        &[Category::Co, Category::No2],
    ),
    (
        SensorType::VehicleCounter,
        "Vehicle Counter",
        &[Category::VehicleCount, Category::TruckCount],
    ),
    (
        SensorType::BridgeSensor,
        "Bridge Sensor",
        &[Category::Deflection, Category::Vibration],
    ),
];

impl SensorType {
    pub fn from_label(label: &str) -> Self {
        SENSOR_TYPES
            .iter()
            .find(|(_, l, _)| *l == label)
            .map(|(t, _, _)| t.clone())
            .unwrap_or_else(|| SensorType::Unknown(label.to_string()))
    }

    pub fn label(&self) -> &str {
        match self {
            SensorType::Unknown(label) => label.as_str(),
            known => SENSOR_TYPES
                .iter()
                .find(|(t, _, _)| t == known)
                .map(|(_, l, _)| *l)
                .unwrap_or_default(),
        }
    }

    /// Category measured by each observation slot; empty for unknown types.
    pub fn slot_categories(&self) -> &'static [Category] {
        SENSOR_TYPES
            .iter()
            .find(|(t, _, _)| t == self)
            .map(|(_, _, c)| *c)
            .unwrap_or(&[])
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Twin of a physical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorNode {
    pub dt_id: String,
    pub device_id: Option<String>,
    /// dtId of the observed asset.
    pub observes: Option<String>,
    pub sensor_type: SensorType,
    pub observation_value1: Option<f64>,
    pub observation_value2: Option<f64>,
    /// Properties present on the snapshot, used to pick add vs replace.
    pub populated: HashSet<String>,
}

impl SensorNode {
    pub fn observation(&self, slot: usize) -> Option<f64> {
        match slot {
            0 => self.observation_value1,
            1 => self.observation_value2,
            _ => None,
        }
    }
}

impl From<Twin> for SensorNode {
    fn from(twin: Twin) -> Self {
        SensorNode {
            device_id: twin.string("deviceId").map(str::to_string),
            observes: twin.string("observes").map(str::to_string),
            sensor_type: SensorType::from_label(twin.string("type").unwrap_or_default()),
            observation_value1: twin.number(OBSERVATION_SLOTS[0]),
            observation_value2: twin.number(OBSERVATION_SLOTS[1]),
            populated: twin.populated(),
            dt_id: twin.dt_id,
        }
    }
}

/// Twin of a physical asset (tunnel, bridge, road segment).
#[derive(Debug, Clone, PartialEq)]
pub struct AssetNode {
    pub dt_id: String,
    /// `None` when the property is absent.
    pub computed_health: Option<HealthValue>,
}

/// Stored `computedHealth`, which may be unreadable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthValue {
    Number(f64),
    Unreadable,
}

impl From<Twin> for AssetNode {
    fn from(twin: Twin) -> Self {
        let computed_health = twin.has(COMPUTED_HEALTH).then(|| {
            twin.number(COMPUTED_HEALTH)
                .map(HealthValue::Number)
                .unwrap_or(HealthValue::Unreadable)
        });
        AssetNode {
            dt_id: twin.dt_id,
            computed_health,
        }
    }
}

/// Pick one twin deterministically: lowest dtId wins.
pub fn first_by_id(mut twins: Vec<Twin>) -> Option<Twin> {
    twins.sort_by(|a, b| a.dt_id.cmp(&b.dt_id));
    twins.into_iter().next()
}

/// Builders for twin query strings.
pub mod query {
    /// Quote a literal for the query language.
    pub fn literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    pub fn sensors_by_device(model: &str, device_id: &str) -> String {
        format!(
            "SELECT * FROM DigitalTwins T WHERE IS_OF_MODEL(T, {}) AND T.deviceId = {}",
            literal(model),
            literal(device_id)
        )
    }

    pub fn sensors_observing(model: &str, asset_id: &str) -> String {
        format!(
            "SELECT * FROM DigitalTwins T WHERE IS_OF_MODEL(T, {}) AND T.observes = {}",
            literal(model),
            literal(asset_id)
        )
    }

    pub fn twin_by_id(dt_id: &str) -> String {
        format!("SELECT * FROM DigitalTwins T WHERE T.$dtId = {}", literal(dt_id))
    }
}

impl TryFrom<serde_json::Value> for Twin {
    type Error = TwinError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map_err(|e| TwinError::Store(format!("malformed twin: {e}")))
    }
}
