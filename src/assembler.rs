/// Builds the outbound reading from a fix and the derived values
use crate::models::{EnrichedReading, EnrichmentCache, RawFix, Smoothed};
use crate::utils::round_to;

const ROOM: &str = "car";
const MS_TO_KMH: f64 = 3.6;

/// Sensor speed converted to km/h, zeroed below the reporting threshold
///
/// The threshold is compared against the sensor's own m/s value so GPS jitter
/// while parked never shows up as movement.
pub fn report_speed(speed_ms: f64, threshold: f64) -> f64 {
    if speed_ms < threshold {
        0.0
    } else {
        speed_ms * MS_TO_KMH
    }
}

pub fn assemble(
    fix: &RawFix,
    position: (f64, f64),
    smoothed: &Smoothed,
    cache: &EnrichmentCache,
    mqtt_fail: i64,
) -> EnrichedReading {
    let (latitude, longitude) = position;
    let address = &cache.address;

    EnrichedReading {
        latitude,
        longitude,
        altitude: fix.altitude.unwrap_or(0.0),
        climb: fix.climb.unwrap_or(0.0),
        speed: round_to(smoothed.speed, 1),
        average_speed: smoothed.average_speed.map(|s| round_to(s, 1)),
        bearing: fix.track,
        bearing_delta: smoothed.bearing_delta.map(|d| round_to(d, 1)),
        gps_accuracy: fix.accuracy,
        street: address.street.clone(),
        postcode: address.postcode.clone(),
        suburb: address.suburb.clone(),
        city: address.city.clone(),
        country: address.country.clone(),
        time: fix.time.clone(),
        satellites: fix.satellites,
        mqtt_fail,
        speed_limit: cache.speed_limit.clone(),
        room: ROOM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, FixMode, SpeedLimit};

    fn fix() -> RawFix {
        RawFix {
            latitude: Some(60.17),
            longitude: Some(24.94),
            speed: 10.0,
            track: Some(90.0),
            altitude: None,
            climb: None,
            satellites: 7,
            mode: FixMode::TwoD,
            accuracy: 3.5,
            time: Some("2024-05-01T10:00:00.000Z".into()),
        }
    }

    #[test]
    fn slow_speeds_report_as_zero() {
        assert_eq!(report_speed(0.5, 1.0), 0.0);
        assert_eq!(report_speed(10.0, 1.0), 36.0);
    }

    #[test]
    fn defaults_missing_altitude_and_climb() {
        let smoothed = Smoothed {
            speed: 36.0,
            average_speed: None,
            bearing_delta: None,
        };
        let cache = EnrichmentCache {
            address: Address {
                street: "Mannerheimintie".into(),
                city: "Helsinki".into(),
                ..Address::default()
            },
            speed_limit: SpeedLimit::Kmh(40),
            last_fetch: None,
        };

        let reading = assemble(&fix(), (60.17, 24.94), &smoothed, &cache, 0);
        assert_eq!(reading.altitude, 0.0);
        assert_eq!(reading.climb, 0.0);
        assert_eq!(reading.speed, 36.0);
        assert_eq!(reading.street, "Mannerheimintie");
        assert_eq!(reading.room, "car");
    }

    #[test]
    fn payload_keys() {
        let smoothed = Smoothed {
            speed: 36.04,
            average_speed: Some(35.55),
            bearing_delta: Some(12.0),
        };
        let reading = assemble(
            &fix(),
            (60.17, 24.94),
            &smoothed,
            &EnrichmentCache::default(),
            1_700_000_000,
        );
        let json: serde_json::Value = serde_json::from_str(&reading.to_json().unwrap()).unwrap();

        for key in [
            "latitude", "longitude", "altitude", "climb", "speed", "bearing", "gps_accuracy",
            "street", "postcode", "suburb", "city", "country", "time", "satellites", "mqtt_fail",
            "speed_limit", "room",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["speed"], 36.0);
        assert_eq!(json["mqtt_fail"], 1_700_000_000i64);
        assert_eq!(json["speed_limit"], 0);
        assert_eq!(json["room"], "car");
        assert_eq!(json["time"], "2024-05-01T10:00:00.000Z");
    }
}
