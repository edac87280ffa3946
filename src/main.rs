mod assembler;
mod config;
mod display;
mod enrichment;
mod gate;
mod gpsd;
mod models;
mod mqtt;
mod overlay;
mod pipeline;
mod smoothing;
mod utils;

use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};

use config::BridgeConfig;
use enrichment::{http_client, Enricher, NominatimGeocoder, OverpassSpeedLimits};
use gate::FixGate;
use gpsd::GpsdClient;
use mqtt::{BrokerEndpoint, BrokerSet, Discovery, MqttTransport};
use overlay::{OverlayNotifier, TelnetLink};
use pipeline::Pipeline;
use smoothing::SmoothingBuffer;
use utils::format_datetime;

async fn build_pipeline(config: &BridgeConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let http = http_client(&config.enrichment.user_agent, config.enrichment.timeout)?;
    let geocoder = NominatimGeocoder::new(http.clone(), &config.enrichment.geocoder_url)?;
    let speed_limits = OverpassSpeedLimits::new(http, &config.enrichment.speed_limit_url)?;
    let enricher = Enricher::new(Box::new(geocoder), Box::new(speed_limits));

    let mqtt = &config.mqtt;
    let discovery = mqtt
        .discovery
        .then(|| Discovery::device_tracker(&mqtt.device_id, &mqtt.topic));
    let endpoints = mqtt
        .brokers
        .iter()
        .enumerate()
        .map(|(index, broker)| {
            let transport = MqttTransport::new(
                format!("{}-{}", mqtt.client_id, index),
                mqtt.connect_timeout,
                discovery.clone(),
            );
            BrokerEndpoint::new(broker.host.clone(), broker.port, Box::new(transport))
        })
        .collect();

    // No reachable broker at all is fatal
    let mut brokers = BrokerSet::new(endpoints, mqtt.retry_interval);
    brokers.connect_all(OffsetDateTime::now_utc()).await?;

    let overlay = if config.overlay.enabled {
        let link = TelnetLink::new(config.overlay.host.clone(), config.overlay.port);
        let mut notifier = OverlayNotifier::new(Box::new(link), config.overlay.monitors.clone());
        notifier.connect().await;
        Some(notifier)
    } else {
        None
    };

    let smoothing = &config.smoothing;
    let gate = FixGate {
        degree_threshold: smoothing.degree_threshold,
        bearing_window: smoothing.bearing_buffer as f64 * config.poll_interval.as_secs_f64(),
        time_threshold: smoothing.time_threshold,
        street_refresh: smoothing.street_refresh,
    };

    Ok(Pipeline::new(
        SmoothingBuffer::new(smoothing.speed_buffer, smoothing.bearing_buffer),
        gate,
        enricher,
        brokers,
        overlay,
        mqtt.topic.clone(),
        smoothing.speed_threshold,
    ))
}

async fn main_loop(
    config: BridgeConfig,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting GPS to MQTT bridge");

    let mut gpsd = GpsdClient::connect(&config.gpsd_host, config.gpsd_port).await?;
    let mut pipeline = build_pipeline(&config).await?;

    for endpoint in pipeline.brokers().endpoints() {
        debug!("Broker {} is {:?}", endpoint.label(), endpoint.state());
    }
    info!(
        "Publishing to '{}' via {} of {} brokers",
        config.mqtt.topic,
        pipeline.brokers().connected_count(),
        config.mqtt.brokers.len()
    );

    loop {
        let cycle_start = Instant::now();
        let now = OffsetDateTime::now_utc();

        match gpsd.current_fix().await {
            Ok(fix) => {
                if let Some(reading) = pipeline.process_fix(&fix, now).await {
                    debug!(
                        "Cycle at {}: {:.1} km/h {}",
                        format_datetime(&now),
                        reading.speed,
                        reading.street
                    );
                }
            }
            Err(e) => {
                pipeline.sensor_unavailable(&e);
                if e != "no data" {
                    match GpsdClient::connect(&config.gpsd_host, config.gpsd_port).await {
                        Ok(client) => gpsd = client,
                        Err(e) => debug!("gpsd reconnect failed: {}", e),
                    }
                }
            }
        }

        // Shutdown is only observed between cycles
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping after completed cycle");
                break;
            }
            _ = sleep_until(cycle_start + config.poll_interval) => {}
        }
    }

    pipeline.brokers_mut().disconnect_all().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging, RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BridgeConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive so the loop is not told to stop
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        let _ = tx.send(());
    });

    match main_loop(config, rx).await {
        Ok(()) => {
            info!("Program terminated by user. Exiting gracefully.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            Err(e)
        }
    }
}
