/// Publish endpoints with per-broker connection health and rate-limited retries
use log::{error, info, warn};
use std::time::Duration;
use time::OffsetDateTime;

use crate::mqtt::transport::Transport;
use crate::utils::seconds_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    transport: Box<dyn Transport>,
    state: LinkState,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, transport: Box<dyn Transport>) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&mut self) -> Result<(), String> {
        self.state = LinkState::Connecting;
        match self.transport.connect(&self.host, self.port).await {
            Ok(()) => {
                self.state = LinkState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(e)
            }
        }
    }
}

/// Ordered set of broker endpoints sharing one failure clock
///
/// The clock holds the time of the most recent connection failure on any
/// endpoint and is cleared only once every endpoint is connected again. It is
/// surfaced to consumers as `mqtt_fail`.
pub struct BrokerSet {
    endpoints: Vec<BrokerEndpoint>,
    retry_interval: Duration,
    last_failure: Option<OffsetDateTime>,
}

impl BrokerSet {
    pub fn new(endpoints: Vec<BrokerEndpoint>, retry_interval: Duration) -> Self {
        Self {
            endpoints,
            retry_interval,
            last_failure: None,
        }
    }

    pub fn endpoints(&self) -> &[BrokerEndpoint] {
        &self.endpoints
    }

    pub fn connected_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_connected()).count()
    }

    /// Epoch seconds of the last connection failure, 0 while healthy
    pub fn failure_timestamp(&self) -> i64 {
        self.last_failure.map(|t| t.unix_timestamp()).unwrap_or(0)
    }

    /// Connect every endpoint in order
    ///
    /// Fails only when no endpoint could be reached. With at least one
    /// connected endpoint the set runs degraded and the rest are retried later.
    pub async fn connect_all(&mut self, now: OffsetDateTime) -> Result<usize, String> {
        let mut connected = 0;

        for endpoint in self.endpoints.iter_mut() {
            match endpoint.connect().await {
                Ok(()) => {
                    info!("Connected to MQTT broker {}", endpoint.label());
                    connected += 1;
                }
                Err(e) => {
                    error!("Could not connect: {}: {}", endpoint.label(), e);
                    self.last_failure = Some(now);
                }
            }
        }

        if connected == 0 {
            let labels: Vec<String> = self.endpoints.iter().map(|e| e.label()).collect();
            return Err(format!(
                "Could not connect any of the MQTT brokers: {}",
                labels.join(", ")
            ));
        }

        if connected == self.endpoints.len() {
            info!("All brokers connected!");
            self.last_failure = None;
        } else {
            warn!(
                "Running degraded: {} of {} brokers connected",
                connected,
                self.endpoints.len()
            );
        }

        Ok(connected)
    }

    /// Whether a failure is outstanding and the retry interval has elapsed
    pub fn retry_due(&self, now: OffsetDateTime) -> bool {
        match self.last_failure {
            Some(failed_at) => seconds_between(failed_at, now) > self.retry_interval.as_secs_f64(),
            None => false,
        }
    }

    /// Reconnect every disconnected endpoint, returning the number of attempts
    ///
    /// Does nothing until the retry interval has passed since the last
    /// failure, so a down broker is not hammered every cycle.
    pub async fn retry_disconnected(&mut self, now: OffsetDateTime) -> usize {
        if !self.retry_due(now) {
            return 0;
        }

        let mut attempts = 0;
        let mut all_connected = true;

        for endpoint in self.endpoints.iter_mut().filter(|e| !e.is_connected()) {
            attempts += 1;
            match endpoint.connect().await {
                Ok(()) => info!("Connection successful: {}", endpoint.label()),
                Err(e) => {
                    error!("Could not connect: {}: {}", endpoint.label(), e);
                    self.last_failure = Some(now);
                    all_connected = false;
                }
            }
        }

        if all_connected {
            info!("All brokers connected!");
            self.last_failure = None;
        } else {
            error!(
                "Retry failed: {} of {} brokers connected",
                self.connected_count(),
                self.endpoints.len()
            );
        }

        attempts
    }

    /// Publish to every connected endpoint, returning how many accepted it
    ///
    /// Disconnected endpoints are skipped; nothing is queued for them.
    pub async fn publish_all(&mut self, topic: &str, payload: &str, now: OffsetDateTime) -> usize {
        self.reap_lost_links(now);

        if self.retry_due(now) {
            self.retry_disconnected(now).await;
        }

        let mut delivered = 0;
        for endpoint in self.endpoints.iter_mut().filter(|e| e.is_connected()) {
            match endpoint.transport.publish(topic, payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!("Publish to {} failed: {}", endpoint.label(), e);
                    endpoint.state = LinkState::Disconnected;
                    self.last_failure = Some(now);
                }
            }
        }

        delivered
    }

    pub async fn disconnect_all(&mut self) {
        for endpoint in self.endpoints.iter_mut() {
            endpoint.transport.disconnect().await;
            endpoint.state = LinkState::Disconnected;
            info!("Disconnected from {}", endpoint.label());
        }
    }

    // Background I/O only raises a flag; the state change happens here
    fn reap_lost_links(&mut self, now: OffsetDateTime) {
        for endpoint in self.endpoints.iter_mut() {
            if endpoint.is_connected() && endpoint.transport.link_lost() {
                warn!("Unexpected MQTT disconnection: {}", endpoint.label());
                endpoint.state = LinkState::Disconnected;
                self.last_failure = Some(now);
            }
        }
    }
}
