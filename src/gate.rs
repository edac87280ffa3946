// Decides when the expensive address and speed limit lookups should run

/// Inputs observed for one cycle, all durations in seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct GateInput {
    pub bearing_delta: Option<f64>,
    /// `None` until the first successful address lookup
    pub since_last_fetch: Option<f64>,
    /// `None` on the first cycle
    pub since_previous_cycle: Option<f64>,
    pub average_speed: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct FixGate {
    pub degree_threshold: f64,
    /// Time covered by the bearing window
    pub bearing_window: f64,
    pub time_threshold: f64,
    pub street_refresh: f64,
}

impl FixGate {
    pub fn should_enrich(&self, input: &GateInput) -> bool {
        // Cold start: nothing averaged yet
        let Some(_average_speed) = input.average_speed else {
            return true;
        };

        let since_fetch = input.since_last_fetch.unwrap_or(f64::INFINITY);

        // Turned, and the previous lookup was not made during this same turn
        if let Some(delta) = input.bearing_delta {
            if delta >= self.degree_threshold && since_fetch >= self.bearing_window {
                return true;
            }
        }

        if since_fetch > self.street_refresh {
            return true;
        }

        matches!(input.since_previous_cycle, Some(gap) if gap > self.time_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> FixGate {
        FixGate {
            degree_threshold: 30.0,
            bearing_window: 5.0,
            time_threshold: 30.0,
            street_refresh: 60.0,
        }
    }

    fn steady() -> GateInput {
        GateInput {
            bearing_delta: Some(2.0),
            since_last_fetch: Some(10.0),
            since_previous_cycle: Some(1.0),
            average_speed: Some(50.0),
        }
    }

    #[test]
    fn cold_start_always_enriches() {
        assert!(gate().should_enrich(&GateInput::default()));
    }

    #[test]
    fn steady_driving_with_recent_fetch_skips() {
        assert!(!gate().should_enrich(&steady()));
        assert!(!gate().should_enrich(&steady()));
    }

    #[test]
    fn turn_enriches_once_window_has_passed() {
        let mut input = steady();
        input.bearing_delta = Some(45.0);
        assert!(gate().should_enrich(&input));

        input.since_last_fetch = Some(2.0);
        assert!(!gate().should_enrich(&input));
    }

    #[test]
    fn threshold_delta_counts_as_turn() {
        let mut input = steady();
        input.bearing_delta = Some(30.0);
        input.since_last_fetch = Some(5.0);
        assert!(gate().should_enrich(&input));
    }

    #[test]
    fn stale_street_is_refreshed() {
        let mut input = steady();
        input.since_last_fetch = Some(61.0);
        assert!(gate().should_enrich(&input));

        input.since_last_fetch = None;
        assert!(gate().should_enrich(&input));
    }

    #[test]
    fn long_gap_between_cycles_enriches() {
        let mut input = steady();
        input.since_previous_cycle = Some(31.0);
        assert!(gate().should_enrich(&input));
    }
}
