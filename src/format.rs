//! Rendering of metric values through descriptor format templates.
//!
//! A template is literal text around one placeholder: `{duration.<unit>}`
//! renders a quantity given in the anchor unit with an auto-chosen human
//! unit, `{number}` renders with SI-style magnitude suffixes. Anything the
//! renderer does not recognise passes the raw value through, so an unknown
//! template never breaks a report.

/// Time units and their size in milliseconds, smallest first.
const TIME_UNITS: [(&str, f64); 6] = [
    ("ns", 1e-6),
    ("us", 1e-3),
    ("ms", 1.0),
    ("s", 1e3),
    ("m", 6e4),
    ("h", 3.6e6),
];

const NUMBER_UNITS: [(&str, f64); 4] = [("T", 1e12), ("G", 1e9), ("M", 1e6), ("K", 1e3)];

/// Render a numeric value through a descriptor format template.
///
/// ```
/// use scenebench::format_value;
///
/// assert_eq!(format_value("{duration.ms}", 0.25), "250 us");
/// assert_eq!(format_value("{number} ops/s", 1_500_000.0), "1.5M ops/s");
/// ```
pub fn format_value(template: &str, value: f64) -> String {
    let (Some(start), Some(end)) = (template.find('{'), template.find('}')) else {
        return format!("{} {}", trim_decimals(value), template.trim());
    };
    if end < start {
        return trim_decimals(value);
    }

    let placeholder = &template[start + 1..end];
    let rendered = match placeholder.strip_prefix("duration.") {
        Some(anchor) => format_duration(value, anchor),
        None if placeholder == "number" => format_number(value),
        None => trim_decimals(value),
    };
    format!("{}{}{}", &template[..start], rendered, &template[end + 1..])
}

/// Render a duration given in `anchor` units with an auto-chosen unit.
pub fn format_duration(value: f64, anchor: &str) -> String {
    let anchor_ms = TIME_UNITS
        .iter()
        .find(|(unit, _)| *unit == anchor)
        .map(|(_, ms)| *ms)
        .unwrap_or(1.0);
    let ms = value * anchor_ms;

    if ms == 0.0 {
        return "0 ms".to_string();
    }

    // The largest unit the value still reaches one of; ns as the floor.
    let (unit, unit_ms) = TIME_UNITS
        .iter()
        .rev()
        .find(|(_, unit_ms)| ms.abs() >= *unit_ms)
        .unwrap_or(&TIME_UNITS[0]);
    format!("{} {}", trim_decimals(ms / unit_ms), unit)
}

/// Render a number with SI magnitude suffixes (`K`, `M`, `G`, `T`).
pub fn format_number(value: f64) -> String {
    for (suffix, size) in NUMBER_UNITS {
        if value.abs() >= size {
            return format!("{}{}", trim_decimals(value / size), suffix);
        }
    }
    trim_decimals(value)
}

fn trim_decimals(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
