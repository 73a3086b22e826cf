//! Conversion of Event Hub deliveries into [`InboundEvent`]s.

use azeventhubs::ReceivedEventData;
use fe2o3_amqp_types::messaging::annotations::AnnotationKey;
use fe2o3_amqp_types::messaging::MessageAnnotations;
use fe2o3_amqp_types::primitives::Value;

use crate::telemetry::InboundEvent;

/// Message annotation IoT Hub stamps with the sending device's identity.
pub const DEVICE_ID_ANNOTATION: &str = "iothub-connection-device-id";

/// Device id carried in the message annotations, if any.
pub fn device_id_annotation(annotations: Option<&MessageAnnotations>) -> Option<String> {
    let value = annotations?.get(&DEVICE_ID_ANNOTATION as &dyn AnnotationKey)?;
    let id = match value {
        Value::String(s) => s.as_str(),
        Value::Symbol(s) => s.0.as_str(),
        _ => return None,
    };
    (!id.is_empty()).then(|| id.to_string())
}

/// Build an [`InboundEvent`] from a received Event Hub message.
///
/// A body that is not a single data section becomes empty and fails to
/// parse downstream.
pub fn inbound_event(event: &ReceivedEventData) -> InboundEvent {
    let message = event.raw_amqp_message();
    let device_id = device_id_annotation(message.message_annotations.as_ref());
    let body = match event.body() {
        Ok(body) => body.to_vec(),
        Err(_) => {
            log::warn!(
                "event {} has no single data section (device {:?})",
                event.sequence_number(),
                device_id
            );
            Vec::new()
        }
    };
    InboundEvent::new(device_id, body)
}

#[cfg(test)]
mod tests {
    use fe2o3_amqp_types::messaging::annotations::{Annotations, OwnedKey};
    use fe2o3_amqp_types::primitives::Symbol;

    use super::*;

    fn annotations(pairs: &[(&str, Value)]) -> MessageAnnotations {
        let mut map = Annotations::new();
        for (key, value) in pairs {
            map.insert(OwnedKey::from(*key), value.clone());
        }
        MessageAnnotations(map)
    }

    #[test]
    fn reads_iot_hub_device_annotation() {
        let a = annotations(&[
            ("x-opt-sequence-number", Value::Long(42)),
            (DEVICE_ID_ANNOTATION, Value::String("sim-7.dev-guid".to_string())),
        ]);
        assert_eq!(device_id_annotation(Some(&a)).as_deref(), Some("sim-7.dev-guid"));
    }

    #[test]
    fn accepts_symbol_values() {
        let a = annotations(&[(DEVICE_ID_ANNOTATION, Value::Symbol(Symbol::from("sim.dev")))]);
        assert_eq!(device_id_annotation(Some(&a)).as_deref(), Some("sim.dev"));
    }

    #[test]
    fn missing_or_unusable_annotation_is_none() {
        assert_eq!(device_id_annotation(None), None);

        let other = annotations(&[("x-opt-offset", Value::String("12".to_string()))]);
        assert_eq!(device_id_annotation(Some(&other)), None);

        let numeric = annotations(&[(DEVICE_ID_ANNOTATION, Value::Long(5))]);
        assert_eq!(device_id_annotation(Some(&numeric)), None);

        let empty = annotations(&[(DEVICE_ID_ANNOTATION, Value::String(String::new()))]);
        assert_eq!(device_id_annotation(Some(&empty)), None);
    }
}
