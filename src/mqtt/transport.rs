/// MQTT transport owned by a single broker endpoint
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::mqtt::discovery::{Discovery, HA_STATUS_TOPIC};

const KEEP_ALIVE_SECS: u64 = 30;
const CHANNEL_CAPACITY: usize = 64;
const DISCONNECT_GRACE_MS: u64 = 500;

/// Connection to one broker
///
/// `connect` blocks the caller until the broker accepted the session or
/// refused it. Afterwards the link is serviced in the background and
/// `publish` only enqueues. A background failure is reported through
/// `link_lost`; the owner decides when to reconnect.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), String>;
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String>;
    fn link_lost(&self) -> bool;
    async fn disconnect(&mut self);
}

pub struct MqttTransport {
    client_id: String,
    connect_timeout: Duration,
    discovery: Option<Discovery>,
    client: Option<AsyncClient>,
    io_task: Option<JoinHandle<()>>,
    lost: Arc<AtomicBool>,
}

impl MqttTransport {
    pub fn new(client_id: String, connect_timeout: Duration, discovery: Option<Discovery>) -> Self {
        Self {
            client_id,
            connect_timeout,
            discovery,
            client: None,
            io_task: None,
            lost: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), String> {
        // Every attempt starts from a fresh client and event loop
        self.disconnect().await;

        let mut options = MqttOptions::new(self.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        options.set_clean_session(true);
        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        timeout(self.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| format!("Timed out waiting for CONNACK from {}:{}", host, port))??;

        if let Some(discovery) = &self.discovery {
            announce(&client, discovery);
        }

        let lost = Arc::new(AtomicBool::new(false));
        self.lost = lost.clone();
        self.io_task = Some(tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            self.discovery.clone(),
            lost,
            format!("{}:{}", host, port),
        )));
        self.client = Some(client);

        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String> {
        let client = self.client.as_ref().ok_or("not connected")?;
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| format!("Publish failed: {}", e))
    }

    fn link_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
        }

        if let Some(mut task) = self.io_task.take() {
            // Let the event loop flush the DISCONNECT packet before tearing it down
            if timeout(Duration::from_millis(DISCONNECT_GRACE_MS), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("Broker refused connection: {:?}", ack.code))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(format!("Connection error: {}", e)),
        }
    }
}

fn announce(client: &AsyncClient, discovery: &Discovery) {
    if let Err(e) = client.try_subscribe(HA_STATUS_TOPIC, QoS::AtMostOnce) {
        error!("Failed to subscribe to {}: {}", HA_STATUS_TOPIC, e);
    }
    match client.try_publish(
        discovery.topic.as_str(),
        QoS::AtLeastOnce,
        true,
        discovery.payload.as_bytes().to_vec(),
    ) {
        Ok(()) => debug!("Published discovery configuration to {}", discovery.topic),
        Err(e) => error!("Failed to publish discovery configuration: {}", e),
    }
}

/// Services the link until it fails, then raises the `lost` flag and exits
async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    discovery: Option<Discovery>,
    lost: Arc<AtomicBool>,
    endpoint: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(message))) => {
                let online =
                    message.topic == HA_STATUS_TOPIC && message.payload.as_ref() == b"online";
                if let (true, Some(discovery)) = (online, &discovery) {
                    info!("Home Assistant came online, resending discovery to {}", endpoint);
                    announce(&client, discovery);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker {} closed the session", endpoint);
                lost.store(true, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT link to {} lost: {}", endpoint, e);
                lost.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// In-memory transport whose reachability is switched by the test
    #[derive(Clone)]
    pub struct FakeTransport {
        pub reachable: Arc<AtomicBool>,
        pub lost: Arc<AtomicBool>,
        pub fail_publish: Arc<AtomicBool>,
        pub connects: Arc<AtomicUsize>,
        pub published: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeTransport {
        pub fn new(reachable: bool) -> Self {
            Self {
                reachable: Arc::new(AtomicBool::new(reachable)),
                lost: Arc::new(AtomicBool::new(false)),
                fail_publish: Arc::new(AtomicBool::new(false)),
                connects: Arc::new(AtomicUsize::new(0)),
                published: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn connect_attempts(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn payloads(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(_, payload)| payload.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&mut self, _host: &str, _port: u16) -> Result<(), String> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.reachable.load(Ordering::SeqCst) {
                self.lost.store(false, Ordering::SeqCst);
                Ok(())
            } else {
                Err("Connection refused".into())
            }
        }

        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err("write failed".into());
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        fn link_lost(&self) -> bool {
            self.lost.load(Ordering::SeqCst)
        }

        async fn disconnect(&mut self) {}
    }
}
