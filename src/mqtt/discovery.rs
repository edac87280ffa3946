/// Home Assistant MQTT discovery document for the device tracker
use serde_json::json;

pub const HA_STATUS_TOPIC: &str = "homeassistant/status";

#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub topic: String,
    pub payload: String,
}

impl Discovery {
    /// Device tracker whose attributes come from the reading topic
    pub fn device_tracker(device_id: &str, attributes_topic: &str) -> Self {
        let payload = json!({
            "name": format!("GPS Module {}", device_id),
            "unique_id": format!("gps-module-{}", device_id),
            "json_attributes_topic": attributes_topic,
            "source_type": "gps",
            "payload_home": "home",
            "payload_not_home": "not_home",
        });

        Discovery {
            topic: format!("homeassistant/device_tracker/gps_module_{}/config", device_id),
            payload: payload.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_points_at_reading_topic() {
        let discovery = Discovery::device_tracker("car", "gps_module/attributes");
        assert_eq!(
            discovery.topic,
            "homeassistant/device_tracker/gps_module_car/config"
        );

        let payload: serde_json::Value = serde_json::from_str(&discovery.payload).unwrap();
        assert_eq!(payload["json_attributes_topic"], "gps_module/attributes");
        assert_eq!(payload["unique_id"], "gps-module-car");
    }
}
