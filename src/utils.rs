/// Utility functions for data processing and formatting
use time::{format_description, OffsetDateTime};

// Closest plain ASCII for letters the overlay daemon cannot render
const TRANSLITERATIONS: &[(char, &str)] = &[
    ('Å', "A"),
    ('Ä', "A"),
    ('Á', "A"),
    ('À', "A"),
    ('Ö', "O"),
    ('Ó', "O"),
    ('Ø', "O"),
    ('Ü', "U"),
    ('Ú', "U"),
    ('É', "E"),
    ('È', "E"),
    ('Ñ', "N"),
    ('Ç', "C"),
    ('Š', "S"),
    ('Ž', "Z"),
    ('Æ', "AE"),
    ('å', "a"),
    ('ä', "a"),
    ('á', "a"),
    ('à', "a"),
    ('ö', "o"),
    ('ó', "o"),
    ('ø', "o"),
    ('ü', "u"),
    ('ú', "u"),
    ('é', "e"),
    ('è', "e"),
    ('ñ', "n"),
    ('ç', "c"),
    ('š', "s"),
    ('ž', "z"),
    ('æ', "ae"),
    ('ß', "ss"),
];

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    format_with(dt, "[day].[month].[year] - [hour]:[minute]:[second]")
}

/// Wall clock part of a timestamp, HH:MM:SS
pub fn format_clock(dt: &OffsetDateTime) -> String {
    format_with(dt, "[hour]:[minute]:[second]")
}

fn format_with(dt: &OffsetDateTime, description: &str) -> String {
    match format_description::parse(description) {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Seconds elapsed between two instants as a float
///
/// Negative durations (clock stepped backwards) count as zero.
pub fn seconds_between(earlier: OffsetDateTime, later: OffsetDateTime) -> f64 {
    (later - earlier).as_seconds_f64().max(0.0)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Replace accented Latin letters with their closest ASCII equivalent
pub fn transliterate_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match TRANSLITERATIONS.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => out.push_str(to),
            None => out.push(ch),
        }
    }
    out
}

/// Render decimal degrees as D°M'S"
pub fn decimal_to_dms(decimal_degrees: f64) -> String {
    let degrees = decimal_degrees.trunc();
    let decimal_minutes = (decimal_degrees - degrees).abs() * 60.0;
    let minutes = decimal_minutes.trunc();
    let seconds = ((decimal_minutes - minutes) * 60.0).round();

    format!("{}°{}'{}\"", degrees as i64, minutes as i64, seconds as i64)
}
