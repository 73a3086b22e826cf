use std::collections::HashMap;

use crate::error::TwinError;

/// Raw event as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Device identifier from event metadata, e.g. `"sim-id.device-guid"`.
    pub device_id: Option<String>,
    pub body: Vec<u8>,
}

impl InboundEvent {
    pub fn new(device_id: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        InboundEvent {
            device_id,
            body: body.into(),
        }
    }
}

/// Keys under which a message body may embed its device id.
const BODY_DEVICE_ID_KEYS: [&str; 3] = ["deviceId", "DeviceId", "device_id"];

/// A parsed telemetry event.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Composite id as received; see [`crate::resolver::strip_device_prefix`].
    pub device_id: String,
    pub payload: HashMap<String, f64>,
}

impl TelemetryEvent {
    /// Parse an inbound event. Metadata device id takes precedence over one
    /// embedded in the body.
    pub fn parse(event: &InboundEvent) -> Result<Self, TwinError> {
        let mut body: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&event.body)
                .map_err(|e| TwinError::Parse(format!("invalid message body: {e}")))?;

        let embedded = BODY_DEVICE_ID_KEYS
            .iter()
            .find_map(|key| body.remove(*key))
            .and_then(|v| v.as_str().map(str::to_string));

        let device_id = event
            .device_id
            .clone()
            .or(embedded)
            .ok_or_else(|| TwinError::Parse("message carries no device id".to_string()))?;

        let mut payload = HashMap::new();
        for (name, value) in body {
            if let Some(n) = numeric(&value) {
                payload.insert(name, n);
            } else if MEASUREMENT_FIELDS.contains(&name.as_str()) {
                return Err(TwinError::Parse(format!("{name} is not numeric: {value}")));
            }
        }

        Ok(TelemetryEvent { device_id, payload })
    }
}

/// Finite number from a JSON number or numeric string.
fn numeric(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n: &f64| n.is_finite())
}

/// Field sets a payload may carry, each filling observation slots in order.
const FIELD_SETS: [&[&str]; 4] = [
    &["temperature"],
    &["co", "no2"],
    &["vehicles", "trucks"],
    &["deflection", "accelerometer"],
];

const MEASUREMENT_FIELDS: [&str; 7] = [
    "temperature",
    "co",
    "no2",
    "vehicles",
    "trucks",
    "deflection",
    "accelerometer",
];

/// Values a payload provides for the two observation slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value1: f64,
    pub value2: Option<f64>,
}

impl Reading {
    /// Map a payload onto observation slots.
    ///
    /// `Ok(None)` when no known field set is present. A set that is only
    /// partly present is a parse error.
    pub fn from_payload(payload: &HashMap<String, f64>) -> Result<Option<Self>, TwinError> {
        let Some(fields) = FIELD_SETS
            .iter()
            .find(|set| set.iter().any(|f| payload.contains_key(*f)))
        else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            let value = payload
                .get(*field)
                .ok_or_else(|| TwinError::Parse(format!("payload is missing {field}")))?;
            values.push(*value);
        }

        Ok(Some(Reading {
            value1: values[0],
            value2: values.get(1).copied(),
        }))
    }

    /// `(slot, value)` pairs to write.
    pub fn slots(&self) -> impl Iterator<Item = (usize, f64)> {
        std::iter::once((0, self.value1)).chain(self.value2.map(|v| (1, v)))
    }
}
