/// Console status panel mirroring what a small in-car display would show
use time::OffsetDateTime;

use crate::models::EnrichedReading;
use crate::utils::{decimal_to_dms, format_clock};

const PANEL_WIDTH: usize = 19;

pub fn status_panel(reading: &EnrichedReading, now: &OffsetDateTime) -> Vec<String> {
    let link = if reading.mqtt_fail != 0 { "NOK" } else { "OK" };
    let bearing = reading.bearing.map(|b| b.round() as i64).unwrap_or(0);

    let rows = vec![
        format!("{}, {}", reading.street, reading.city),
        format!(
            "{:<8} {}",
            decimal_to_dms(reading.latitude),
            decimal_to_dms(reading.longitude)
        ),
        format!(
            "{:>3} km/h ({}) {:>3}°",
            reading.speed.round() as i64,
            reading.speed_limit,
            bearing
        ),
        format!("S{} {} {}", reading.satellites, link, format_clock(now)),
    ];

    let mut panel = Vec::with_capacity(rows.len() + 2);
    panel.push(format!(".{}.", "-".repeat(PANEL_WIDTH)));
    for row in rows {
        panel.push(format!("|{:<width$}|", row, width = PANEL_WIDTH));
    }
    panel.push(format!("'{}'", "-".repeat(PANEL_WIDTH)));
    panel
}
