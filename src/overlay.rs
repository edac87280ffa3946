/// Status text overlay on the video surveillance feed
use async_trait::async_trait;
use log::{debug, error, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::models::Address;
use crate::utils::transliterate_ascii;

const CONNECT_TIMEOUT_SECS: u64 = 3;
const WRITE_TIMEOUT_SECS: u64 = 3;
// One reconnect and resend before a line is dropped
const MAX_SEND_ATTEMPTS: usize = 2;

/// Line-oriented connection to the overlay trigger daemon
#[async_trait]
pub trait OverlayLink: Send {
    async fn connect(&mut self) -> Result<(), String>;
    async fn send_line(&mut self, line: &str) -> Result<(), String>;
}

/// Persistent telnet-style socket to the zmtrigger port
pub struct TelnetLink {
    host: String,
    port: u16,
    write_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TelnetLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            write_timeout: Duration::from_secs(WRITE_TIMEOUT_SECS),
            stream: None,
        }
    }

    #[cfg(test)]
    fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

#[async_trait]
impl OverlayLink for TelnetLink {
    async fn connect(&mut self) -> Result<(), String> {
        self.stream = None;
        debug!("Connecting overlay {}:{}", self.host, self.port);
        let stream = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| format!("Timed out connecting overlay {}:{}", self.host, self.port))?
        .map_err(|e| format!("Unable to connect overlay {}:{}: {}", self.host, self.port, e))?;
        self.stream = Some(stream);
        info!("Overlay connected to {}:{}", self.host, self.port);
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<(), String> {
        let stream = self.stream.as_mut().ok_or("overlay not connected")?;
        let data = format!("{}\r\n", line);
        // A peer that stops reading must not stall the poll loop
        let result = match timeout(self.write_timeout, stream.write_all(data.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Overlay write failed: {}", e)),
            Err(_) => Err(format!("Overlay write to {}:{} timed out", self.host, self.port)),
        };
        if result.is_err() {
            self.stream = None;
        }
        result
    }
}

/// Status line: right-aligned speed followed by the known address
pub fn format_status(speed: i64, address: &Address) -> String {
    let text = format!(
        "{:>3} km/h {} {} {} {} {}",
        speed, address.street, address.postcode, address.suburb, address.city, address.country
    );
    transliterate_ascii(&text)
}

/// `<monitor>|show||||<text>` command understood by the trigger daemon
pub fn overlay_command(monitor: &str, text: &str) -> String {
    format!("{}|show||||{}", monitor, text)
}

pub struct OverlayNotifier {
    link: Box<dyn OverlayLink>,
    monitors: Vec<String>,
    last_speed: Option<i64>,
}

impl OverlayNotifier {
    pub fn new(link: Box<dyn OverlayLink>, monitors: Vec<String>) -> Self {
        Self {
            link,
            monitors,
            last_speed: None,
        }
    }

    /// Initial connection; failure is logged and retried on the first send
    pub async fn connect(&mut self) {
        if let Err(e) = self.link.connect().await {
            error!("{}. Is zmtrigger running?", e);
        }
    }

    /// Push the status line when the rounded speed differs from the last one
    ///
    /// Returns whether a notification was attempted.
    pub async fn notify_if_changed(&mut self, speed: i64, address: &Address) -> bool {
        if self.last_speed == Some(speed) {
            return false;
        }
        self.last_speed = Some(speed);

        let text = format_status(speed, address);
        for monitor in &self.monitors {
            let command = overlay_command(monitor, &text);
            send_with_retry(self.link.as_mut(), &command).await;
        }
        true
    }
}

async fn send_with_retry(link: &mut dyn OverlayLink, command: &str) {
    for attempt in 1..=MAX_SEND_ATTEMPTS {
        match link.send_line(command).await {
            Ok(()) => {
                debug!("Sent: {}", command);
                return;
            }
            Err(e) if attempt < MAX_SEND_ATTEMPTS => {
                error!("{} Reconnecting", e);
                if let Err(e) = link.connect().await {
                    error!("{}", e);
                }
            }
            Err(e) => error!("Unable to send {}: {}", command, e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeLink;
    use super::*;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn address() -> Address {
        Address {
            street: "Hämeentie".into(),
            postcode: "00530".into(),
            suburb: "Sörnäinen".into(),
            city: "Helsinki".into(),
            country: "fi".into(),
        }
    }

    #[test]
    fn status_line_is_padded_and_ascii() {
        assert_eq!(
            format_status(7, &address()),
            "  7 km/h Hameentie 00530 Sornainen Helsinki fi"
        );
        assert_eq!(overlay_command("3", "x"), "3|show||||x");
    }

    #[tokio::test]
    async fn only_speed_changes_notify() {
        let link = FakeLink::default();
        let mut notifier =
            OverlayNotifier::new(Box::new(link.clone()), vec!["3".into(), "4".into()]);

        assert!(notifier.notify_if_changed(50, &address()).await);
        assert!(!notifier.notify_if_changed(50, &address()).await);
        assert!(notifier.notify_if_changed(51, &address()).await);

        let lines = link.lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("3|show|||| 50 km/h"));
        assert!(lines[1].starts_with("4|show|||| 50 km/h"));
        assert!(lines[2].starts_with("3|show|||| 51 km/h"));
    }

    #[tokio::test]
    async fn single_failure_reconnects_and_resends() {
        let link = FakeLink::failing(1);
        let mut notifier = OverlayNotifier::new(Box::new(link.clone()), vec!["3".into()]);

        notifier.notify_if_changed(20, &address()).await;
        assert_eq!(link.connects.load(Ordering::SeqCst), 1);
        assert_eq!(link.lines().len(), 1);
    }

    #[tokio::test]
    async fn second_failure_drops_the_line() {
        let link = FakeLink::failing(2);
        let mut notifier = OverlayNotifier::new(Box::new(link.clone()), vec!["3".into()]);

        notifier.notify_if_changed(20, &address()).await;
        assert_eq!(link.connects.load(Ordering::SeqCst), 1);
        assert!(link.lines().is_empty());

        // The next change goes through again
        notifier.notify_if_changed(21, &address()).await;
        assert_eq!(link.lines().len(), 1);
    }

    #[tokio::test]
    async fn telnet_link_writes_crlf_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let mut link = TelnetLink::new("127.0.0.1", port);
        link.connect().await.unwrap();
        link.send_line("3|show|||| 42 km/h").await.unwrap();

        assert_eq!(server.await.unwrap(), "3|show|||| 42 km/h\r\n");
    }

    #[tokio::test]
    async fn stalled_reader_times_out_the_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            // Hold the socket open without ever reading from it
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut link =
            TelnetLink::new("127.0.0.1", port).with_write_timeout(Duration::from_millis(200));
        link.connect().await.unwrap();

        let line = "x".repeat(1 << 20);
        let outcome = timeout(Duration::from_secs(10), async {
            for _ in 0..256 {
                if let Err(e) = link.send_line(&line).await {
                    return Some(e);
                }
            }
            None
        })
        .await
        .expect("send_line blocked the caller");

        let err = outcome.expect("socket buffers never filled");
        assert!(err.contains("timed out"), "{}", err);
        // The stalled stream is dropped so the next send reconnects
        assert!(link.send_line("x").await.unwrap_err().contains("not connected"));
    }

    #[tokio::test]
    async fn unconnected_telnet_link_errors() {
        let mut link = TelnetLink::new("127.0.0.1", 1);
        assert!(link.send_line("x").await.is_err());
    }
}
