use log::{debug, info};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const DEFAULT_SPEED_LIMIT_URL: &str = "https://overpass-api.de/api/interpreter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub monitors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub brokers: Vec<BrokerAddress>,
    pub topic: String,
    pub client_id: String,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub discovery: bool,
    pub device_id: String,
}

#[derive(Debug, Clone)]
pub struct SmoothingConfig {
    pub speed_buffer: usize,
    pub bearing_buffer: usize,
    pub degree_threshold: f64,
    pub time_threshold: f64,
    pub street_refresh: f64,
    pub speed_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub geocoder_url: String,
    pub speed_limit_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub gpsd_host: String,
    pub gpsd_port: u16,
    pub poll_interval: Duration,
    pub mqtt: MqttConfig,
    pub overlay: OverlayConfig,
    pub smoothing: SmoothingConfig,
    pub enrichment: EnrichmentConfig,
}

impl BridgeConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let brokers = load_brokers()?;
        info!("Total brokers configured: {}", brokers.len());
        for broker in &brokers {
            info!("Broker: {}:{}", broker.host, broker.port);
        }

        let poll_interval = poll_interval(parse_var("POLL_INTERVAL", 1)?)?;

        let mqtt = MqttConfig {
            brokers,
            topic: string_var("MQTT_TOPIC", "gps_module/attributes"),
            client_id: string_var("MQTT_CLIENT_ID", "gps-mqtt-bridge"),
            retry_interval: Duration::from_secs(parse_var("MQTT_RETRY_CONNECT", 10)?),
            connect_timeout: Duration::from_secs(parse_var("MQTT_CONNECT_TIMEOUT", 5)?),
            discovery: parse_flag("HA_DISCOVERY", true)?,
            device_id: string_var("DEVICE_ID", "car"),
        };

        let overlay = OverlayConfig {
            enabled: parse_flag("ZM_ENABLED", false)?,
            host: string_var("ZM_HOST", "127.0.0.1"),
            port: parse_var("ZM_PORT", 6802)?,
            monitors: split_list(&string_var("ZM_MONITORS", "1")),
        };
        if overlay.enabled && overlay.monitors.is_empty() {
            return Err("ZM_ENABLED is set but ZM_MONITORS lists no monitor ids".into());
        }

        let smoothing = SmoothingConfig {
            speed_buffer: parse_var("SPEED_BUFFER_SIZE", 3)?,
            bearing_buffer: parse_var("BEARING_BUFFER_SIZE", 5)?,
            degree_threshold: parse_var("DEGREE_THRESHOLD", 30.0)?,
            time_threshold: parse_var("TIME_THRESHOLD", 30.0)?,
            street_refresh: parse_var("STREET_REFRESH", 60.0)?,
            speed_threshold: parse_var("SPEED_THRESHOLD", 1.0)?,
        };
        if smoothing.speed_buffer == 0 || smoothing.bearing_buffer == 0 {
            return Err("Buffer sizes must be at least 1".into());
        }

        let enrichment = EnrichmentConfig {
            geocoder_url: string_var("GEOCODER_URL", DEFAULT_GEOCODER_URL),
            speed_limit_url: string_var("SPEED_LIMIT_URL", DEFAULT_SPEED_LIMIT_URL),
            user_agent: string_var("HTTP_USER_AGENT", "ha_address_finder"),
            timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT", 5)?),
        };

        let config = BridgeConfig {
            gpsd_host: string_var("GPSD_HOST", "127.0.0.1"),
            gpsd_port: parse_var("GPSD_PORT", 2947)?,
            poll_interval,
            mqtt,
            overlay,
            smoothing,
            enrichment,
        };
        debug!("Configuration: {:?}", config);

        Ok(config)
    }
}

fn load_brokers() -> Result<Vec<BrokerAddress>, Box<dyn std::error::Error>> {
    let mut brokers = Vec::new();

    // Try MQTT_BROKERS format first
    if let Ok(list) = env::var("MQTT_BROKERS") {
        debug!("Found MQTT_BROKERS: '{}'", list);
        for entry in split_list(&list) {
            brokers.push(parse_broker(&entry)?);
        }
    } else {
        // Fallback to individual environment variables, ordered by index
        debug!("MQTT_BROKERS environment variable not found, trying individual variables");
        brokers = indexed_brokers(env::vars())?;
    }

    if brokers.is_empty() {
        return Err(concat!(
            "No MQTT brokers configured. Please set MQTT_BROKERS or ",
            "MQTT_BROKER_<N>_HOST/MQTT_BROKER_<N>_PORT environment variables"
        )
        .into());
    }

    Ok(brokers)
}

fn poll_interval(secs: u64) -> Result<Duration, String> {
    if secs == 0 {
        return Err("POLL_INTERVAL must be at least 1 second".into());
    }
    Ok(Duration::from_secs(secs))
}

/// Brokers from `MQTT_BROKER_<N>_HOST` / `MQTT_BROKER_<N>_PORT` pairs, sorted by N
fn indexed_brokers<I>(vars: I) -> Result<Vec<BrokerAddress>, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();
    let mut indexed = Vec::new();
    for (key, host) in &vars {
        let index = match key
            .strip_prefix("MQTT_BROKER_")
            .and_then(|s| s.strip_suffix("_HOST"))
        {
            Some(index) => index,
            None => continue,
        };
        let host = host.trim();
        if host.is_empty() {
            continue;
        }

        let port_key = format!("MQTT_BROKER_{}_PORT", index);
        let port = match vars.get(&port_key).map(|p| p.trim()) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<u16>()
                .map_err(|e| format!("Invalid value '{}' for {}: {}", raw, port_key, e))?,
            _ => 1883,
        };
        let order = index.parse::<u32>().unwrap_or(u32::MAX);
        indexed.push((
            order,
            index.to_string(),
            BrokerAddress {
                host: host.to_string(),
                port,
            },
        ));
    }

    indexed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(indexed.into_iter().map(|(_, _, broker)| broker).collect())
}

/// Parse `host:port`, defaulting the port to 1883
pub fn parse_broker(entry: &str) -> Result<BrokerAddress, String> {
    let entry = entry.trim();
    let (host, port) = match entry.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| format!("Invalid broker port in '{}': {}", entry, e))?;
            (host.trim(), port)
        }
        None => (entry, 1883),
    };

    if host.is_empty() {
        return Err(format!("Missing broker host in '{}'", entry));
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
    })
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn string_var(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid value '{}' for {}: {}", raw, key, e)),
        _ => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> Result<bool, String> {
    match env::var(key) {
        Ok(raw) => parse_bool(&raw)
            .ok_or_else(|| format!("Invalid value '{}' for {}: expected true/false", raw, key)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
