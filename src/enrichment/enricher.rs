/// Merges geocoder and speed limit results into the enrichment cache
use futures_util::future::join;
use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::enrichment::geocoder::Geocoder;
use crate::enrichment::speed_limit::SpeedLimitSource;
use crate::models::EnrichmentCache;

/// Which cache slots a lookup refreshed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichOutcome {
    pub address_updated: bool,
    pub speed_limit_updated: bool,
}

pub struct Enricher {
    geocoder: Box<dyn Geocoder>,
    speed_limits: Box<dyn SpeedLimitSource>,
    cache: EnrichmentCache,
}

impl Enricher {
    pub fn new(geocoder: Box<dyn Geocoder>, speed_limits: Box<dyn SpeedLimitSource>) -> Self {
        Self {
            geocoder,
            speed_limits,
            cache: EnrichmentCache::default(),
        }
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    /// Run both lookups for a position
    ///
    /// Each result only touches its own slot. `last_fetch` advances only when
    /// the address lookup succeeded, so a failed one is retried on the next
    /// eligible cycle.
    pub async fn enrich(
        &mut self,
        latitude: f64,
        longitude: f64,
        now: OffsetDateTime,
    ) -> EnrichOutcome {
        let (address, speed_limit) = join(
            self.geocoder.reverse(latitude, longitude),
            self.speed_limits.lookup(latitude, longitude),
        )
        .await;

        let mut outcome = EnrichOutcome::default();

        match address {
            Ok(Some(address)) => {
                if address != self.cache.address {
                    info!(
                        "Address: {} {} {} {}",
                        address.street, address.postcode, address.city, address.country
                    );
                }
                self.cache.address = address;
                self.cache.last_fetch = Some(now);
                outcome.address_updated = true;
            }
            Ok(None) => debug!("No address found for {:.5},{:.5}", latitude, longitude),
            Err(e) => warn!("Reverse geocoding failed, keeping previous address: {}", e),
        }

        match speed_limit {
            Ok(Some(limit)) => {
                self.cache.speed_limit = limit;
                outcome.speed_limit_updated = true;
            }
            Ok(None) => debug!("No speed limit tagged near {:.5},{:.5}", latitude, longitude),
            Err(e) => warn!("Speed limit lookup failed, keeping previous limit: {}", e),
        }

        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{address, FakeGeocoder, FakeSpeedLimits};
    use super::*;
    use crate::models::SpeedLimit;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    #[tokio::test]
    async fn successful_lookup_fills_cache() {
        let mut enricher = Enricher::new(
            Box::new(FakeGeocoder::answering(vec![Ok(Some(address("Mannerheimintie")))])),
            Box::new(FakeSpeedLimits::answering(vec![Ok(Some(SpeedLimit::Kmh(40)))])),
        );

        let outcome = enricher.enrich(60.17, 24.94, at(0)).await;
        assert!(outcome.address_updated && outcome.speed_limit_updated);
        assert_eq!(enricher.cache().address.street, "Mannerheimintie");
        assert_eq!(enricher.cache().speed_limit, SpeedLimit::Kmh(40));
        assert_eq!(enricher.cache().last_fetch, Some(at(0)));
    }

    #[tokio::test]
    async fn failed_geocode_keeps_previous_address() {
        let mut enricher = Enricher::new(
            Box::new(FakeGeocoder::answering(vec![
                Ok(Some(address("Mannerheimintie"))),
                Err("HTTP 503".into()),
            ])),
            Box::new(FakeSpeedLimits::answering(vec![
                Ok(Some(SpeedLimit::Kmh(40))),
                Ok(Some(SpeedLimit::Kmh(50))),
            ])),
        );

        enricher.enrich(60.17, 24.94, at(0)).await;
        let before = enricher.cache().address.clone();

        let outcome = enricher.enrich(60.18, 24.95, at(30)).await;
        assert!(!outcome.address_updated);
        assert_eq!(enricher.cache().address, before);
        assert_eq!(enricher.cache().last_fetch, Some(at(0)));
        // The independent lookup still landed
        assert!(outcome.speed_limit_updated);
        assert_eq!(enricher.cache().speed_limit, SpeedLimit::Kmh(50));
    }

    #[tokio::test]
    async fn failed_speed_limit_keeps_previous_limit() {
        let mut enricher = Enricher::new(
            Box::new(FakeGeocoder::answering(vec![Ok(Some(address("Hämeentie")))])),
            Box::new(FakeSpeedLimits::answering(vec![
                Ok(Some(SpeedLimit::Kmh(60))),
                Err("timeout".into()),
                Ok(None),
            ])),
        );

        enricher.enrich(60.17, 24.94, at(0)).await;
        enricher.enrich(60.17, 24.94, at(10)).await;
        assert_eq!(enricher.cache().speed_limit, SpeedLimit::Kmh(60));
        enricher.enrich(60.17, 24.94, at(20)).await;
        assert_eq!(enricher.cache().speed_limit, SpeedLimit::Kmh(60));
        assert_eq!(enricher.cache().last_fetch, Some(at(20)));
    }

    #[tokio::test]
    async fn not_found_does_not_advance_fetch_time() {
        let mut enricher = Enricher::new(
            Box::new(FakeGeocoder::answering(vec![Ok(None)])),
            Box::new(FakeSpeedLimits::answering(vec![Ok(None)])),
        );

        let outcome = enricher.enrich(0.0, 0.0, at(0)).await;
        assert_eq!(outcome, EnrichOutcome::default());
        assert_eq!(enricher.cache().last_fetch, None);
        assert_eq!(enricher.cache().speed_limit, SpeedLimit::Unknown);
    }
}
