/// Minimal gpsd JSON protocol client
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::models::{FixMode, RawFix};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true}\n";
const POLL_COMMAND: &[u8] = b"?POLL;\n";
const READ_TIMEOUT_SECS: u64 = 5;
// Guards against a daemon that keeps streaming other report classes
const MAX_LINES_PER_POLL: usize = 64;

#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    tpv: Vec<Tpv>,
    #[serde(default)]
    sky: Vec<Sky>,
}

#[derive(Debug, Default, Deserialize)]
struct Tpv {
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    climb: Option<f64>,
    speed: Option<f64>,
    track: Option<f64>,
    time: Option<String>,
    epx: Option<f64>,
    epy: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Sky {
    #[serde(rename = "nSat")]
    n_sat: Option<u32>,
    #[serde(default)]
    satellites: Vec<serde_json::Value>,
}

pub struct GpsdClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl GpsdClient {
    /// Connect to gpsd and enable watch mode so POLL has data to report
    pub async fn connect(host: &str, port: u16) -> Result<Self, String> {
        let stream = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| format!("Timed out connecting to gpsd at {}:{}", host, port))?
        .map_err(|e| format!("Could not connect to gpsd at {}:{}: {}", host, port, e))?;

        let (read_half, write_half) = stream.into_split();
        let mut client = GpsdClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        client
            .writer
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|e| format!("Failed to enable gpsd watch mode: {}", e))?;

        info!("Connected to gpsd at {}:{}", host, port);
        Ok(client)
    }

    /// Ask gpsd for its most recent fix
    pub async fn current_fix(&mut self) -> Result<RawFix, String> {
        self.writer
            .write_all(POLL_COMMAND)
            .await
            .map_err(|e| format!("Failed to send POLL: {}", e))?;

        for _ in 0..MAX_LINES_PER_POLL {
            let mut line = String::new();
            let read = timeout(
                Duration::from_secs(READ_TIMEOUT_SECS),
                self.reader.read_line(&mut line),
            )
            .await
            .map_err(|_| "Timed out waiting for gpsd".to_string())?
            .map_err(|e| format!("Failed to read from gpsd: {}", e))?;

            if read == 0 {
                return Err("gpsd closed the connection".into());
            }

            match serde_json::from_str::<Report>(line.trim()) {
                Ok(report) if report.class == "POLL" => return fix_from_poll(report),
                Ok(report) => debug!("Skipping gpsd {} report", report.class),
                Err(e) => debug!("Unparseable gpsd line ({}): {}", e, line.trim()),
            }
        }

        // The POLL reply is still queued behind the skipped lines; the caller reconnects
        warn!(
            "No POLL reply within {} gpsd lines, dropping the session",
            MAX_LINES_PER_POLL
        );
        Err("gpsd POLL reply not received".into())
    }
}

fn fix_from_poll(report: Report) -> Result<RawFix, String> {
    let tpv = report.tpv.into_iter().next().ok_or("no data")?;
    let sky = report.sky.into_iter().next().unwrap_or_default();

    let satellites = sky
        .n_sat
        .unwrap_or_else(|| sky.satellites.len() as u32);
    let accuracy = match (tpv.epx, tpv.epy) {
        (Some(x), Some(y)) => x.max(y),
        (Some(e), None) | (None, Some(e)) => e,
        (None, None) => 0.0,
    };

    Ok(RawFix {
        latitude: tpv.lat,
        longitude: tpv.lon,
        speed: tpv.speed.unwrap_or(0.0),
        track: tpv.track,
        altitude: tpv.alt,
        climb: tpv.climb,
        satellites,
        mode: FixMode::from_gpsd(tpv.mode),
        accuracy,
        time: tpv.time,
    })
}
