const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * KIB;
const GIB: f64 = 1024.0 * MIB;
const TIB: f64 = 1024.0 * GIB;

/// Renders a duration as "Ns", "Mm Ss" or "Hh Mm" depending on magnitude.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    if total < 60 {
        format!("{total}s")
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

/// Renders a byte rate in binary units with one decimal. Non-positive
/// rates render as the "—" placeholder.
pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "—".to_string();
    }
    if bytes_per_sec < MIB {
        format!("{:.1} KiB/s", bytes_per_sec / KIB)
    } else if bytes_per_sec < GIB {
        format!("{:.1} MiB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.1} GiB/s", bytes_per_sec / GIB)
    }
}

/// Renders a byte count in binary units: two decimals below 10 in the
/// chosen unit, one decimal from 10 up.
pub fn format_size(bytes: f64) -> String {
    let bytes = bytes.max(0.0);
    let (value, unit) = if bytes < KIB {
        (bytes, "B")
    } else if bytes < MIB {
        (bytes / KIB, "KiB")
    } else if bytes < GIB {
        (bytes / MIB, "MiB")
    } else if bytes < TIB {
        (bytes / GIB, "GiB")
    } else {
        (bytes / TIB, "TiB")
    };
    if value < 10.0 {
        format!("{value:.2} {unit}")
    } else {
        format!("{value:.1} {unit}")
    }
}

/// Converts a numeric literal read out of log text into raw bytes.
/// Units are case-insensitive; decimal aliases (kb, mb, ...) use the
/// same binary multipliers. An unrecognized unit leaves the value
/// unconverted.
pub fn scale_bytes(value: f64, unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "b" => value,
        "kib" | "kb" => value * KIB,
        "mib" | "mb" => value * MIB,
        "gib" | "gb" => value * GIB,
        "tib" | "tb" => value * TIB,
        _ => value,
    }
}
