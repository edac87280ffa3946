/// One poll cycle: smooth, gate, enrich, assemble, publish, overlay
use log::{debug, info, log_enabled, warn, Level};
use time::OffsetDateTime;

use crate::assembler::{assemble, report_speed};
use crate::display::status_panel;
use crate::enrichment::Enricher;
use crate::gate::{FixGate, GateInput};
use crate::models::{EnrichedReading, RawFix, Smoothed};
use crate::mqtt::BrokerSet;
use crate::overlay::OverlayNotifier;
use crate::smoothing::SmoothingBuffer;
use crate::utils::seconds_between;

pub struct Pipeline {
    smoothing: SmoothingBuffer,
    gate: FixGate,
    enricher: Enricher,
    brokers: BrokerSet,
    overlay: Option<OverlayNotifier>,
    topic: String,
    speed_threshold: f64,
    previous_cycle: Option<OffsetDateTime>,
    // None until the first fix has been seen
    has_fix: Option<bool>,
}

impl Pipeline {
    pub fn new(
        smoothing: SmoothingBuffer,
        gate: FixGate,
        enricher: Enricher,
        brokers: BrokerSet,
        overlay: Option<OverlayNotifier>,
        topic: String,
        speed_threshold: f64,
    ) -> Self {
        Self {
            smoothing,
            gate,
            enricher,
            brokers,
            overlay,
            topic,
            speed_threshold,
            previous_cycle: None,
            has_fix: None,
        }
    }

    pub fn brokers(&self) -> &BrokerSet {
        &self.brokers
    }

    pub fn brokers_mut(&mut self) -> &mut BrokerSet {
        &mut self.brokers
    }

    /// Process one fix, returning the published reading
    ///
    /// Fixes below 2D quality or without a position are skipped.
    pub async fn process_fix(
        &mut self,
        fix: &RawFix,
        now: OffsetDateTime,
    ) -> Option<EnrichedReading> {
        let position = match (fix.mode.is_usable(), fix.latitude, fix.longitude) {
            (true, Some(latitude), Some(longitude)) => (latitude, longitude),
            _ => {
                self.sensor_unavailable(&format!("{:?}", fix.mode));
                return None;
            }
        };
        if self.has_fix != Some(true) {
            info!("GPS fix acquired ({:?})", fix.mode);
            self.has_fix = Some(true);
        }

        let speed = report_speed(fix.speed, self.speed_threshold);
        self.smoothing.push(speed, fix.track);
        let smoothed = Smoothed {
            speed,
            average_speed: self.smoothing.averaged_speed(),
            bearing_delta: self.smoothing.bearing_delta(),
        };

        let input = GateInput {
            bearing_delta: smoothed.bearing_delta,
            since_last_fetch: self
                .enricher
                .cache()
                .last_fetch
                .map(|fetched| seconds_between(fetched, now)),
            since_previous_cycle: self
                .previous_cycle
                .map(|previous| seconds_between(previous, now)),
            average_speed: smoothed.average_speed,
        };
        if self.gate.should_enrich(&input) {
            debug!("Enriching position, gate input {:?}", input);
            let outcome = self.enricher.enrich(position.0, position.1, now).await;
            if !outcome.address_updated || !outcome.speed_limit_updated {
                debug!(
                    "Partial enrichment (address: {}, speed limit: {}), using cached values",
                    outcome.address_updated, outcome.speed_limit_updated
                );
            }
        }

        let reading = assemble(
            fix,
            position,
            &smoothed,
            self.enricher.cache(),
            self.brokers.failure_timestamp(),
        );
        debug!("{:?}", reading);

        match reading.to_json() {
            Ok(payload) => {
                let delivered = self.brokers.publish_all(&self.topic, &payload, now).await;
                debug!("Published to {} brokers", delivered);
            }
            Err(e) => warn!("{}", e),
        }

        if let Some(overlay) = self.overlay.as_mut() {
            let rounded = reading.speed.round() as i64;
            overlay
                .notify_if_changed(rounded, &self.enricher.cache().address)
                .await;
        }

        if log_enabled!(Level::Debug) {
            for row in status_panel(&reading, &now) {
                debug!("{}", row);
            }
        }

        self.previous_cycle = Some(now);
        Some(reading)
    }

    /// Log once when the sensor stops delivering usable fixes
    pub fn sensor_unavailable(&mut self, reason: &str) {
        if self.has_fix != Some(false) {
            warn!("Waiting for valid GPS data ({})", reason);
            self.has_fix = Some(false);
        }
    }
}
