use serde::{Serialize, Serializer};
use time::OffsetDateTime;

/// Fix quality reported by the GPS daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixMode {
    NoFix,
    TwoD,
    ThreeD,
}

impl FixMode {
    /// Map gpsd's numeric `mode` (0 = unknown, 1 = no fix, 2 = 2D, 3 = 3D)
    pub fn from_gpsd(mode: u8) -> Self {
        match mode {
            2 => FixMode::TwoD,
            3 => FixMode::ThreeD,
            _ => FixMode::NoFix,
        }
    }

    pub fn is_usable(self) -> bool {
        self >= FixMode::TwoD
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Horizontal speed in m/s
    pub speed: f64,
    pub track: Option<f64>,
    pub altitude: Option<f64>,
    pub climb: Option<f64>,
    pub satellites: u32,
    pub mode: FixMode,
    pub accuracy: f64,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub postcode: String,
    pub suburb: String,
    pub city: String,
    pub country: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_empty()
            && self.postcode.is_empty()
            && self.suburb.is_empty()
            && self.city.is_empty()
            && self.country.is_empty()
    }
}

/// Posted speed limit as tagged in map data
///
/// Serializes as `0` when unknown, a number for plain km/h values and the raw
/// tag text otherwise (`"FI:urban"`, `"none"`, `"30 mph"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpeedLimit {
    #[default]
    Unknown,
    Kmh(u32),
    Tagged(String),
}

impl SpeedLimit {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        match tag.parse::<u32>() {
            Ok(kmh) => SpeedLimit::Kmh(kmh),
            Err(_) if tag.is_empty() => SpeedLimit::Unknown,
            Err(_) => SpeedLimit::Tagged(tag.to_string()),
        }
    }
}

impl std::fmt::Display for SpeedLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedLimit::Unknown => write!(f, "0"),
            SpeedLimit::Kmh(kmh) => write!(f, "{}", kmh),
            SpeedLimit::Tagged(tag) => write!(f, "{}", tag),
        }
    }
}

impl Serialize for SpeedLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SpeedLimit::Unknown => serializer.serialize_u32(0),
            SpeedLimit::Kmh(kmh) => serializer.serialize_u32(*kmh),
            SpeedLimit::Tagged(tag) => serializer.serialize_str(tag),
        }
    }
}

/// Last known enrichment results
///
/// Only successful lookups overwrite a slot, so a failed request never blanks
/// an address or limit that was known before.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentCache {
    pub address: Address,
    pub speed_limit: SpeedLimit,
    pub last_fetch: Option<OffsetDateTime>,
}

/// Speed and bearing values derived from the smoothing window for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    /// Reported speed in km/h, already zeroed below the reporting threshold
    pub speed: f64,
    pub average_speed: Option<f64>,
    pub bearing_delta: Option<f64>,
}

/// Outbound record published to every broker
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedReading {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub climb: f64,
    pub speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>,
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_delta: Option<f64>,
    pub gps_accuracy: f64,
    pub street: String,
    pub postcode: String,
    pub suburb: String,
    pub city: String,
    pub country: String,
    pub time: Option<String>,
    pub satellites: u32,
    pub mqtt_fail: i64,
    pub speed_limit: SpeedLimit,
    pub room: &'static str,
}

impl EnrichedReading {
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize reading: {}", e))
    }
}
