const SI_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Decimal (SI) size, e.g. `83 MB` or `1.5 kB`. Values under ten units keep
/// one decimal.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 10 {
        return format!("{} B", bytes);
    }
    let mut exponent = 0usize;
    let mut scale = 1u64;
    while exponent + 1 < SI_UNITS.len() && bytes / scale >= 1000 {
        scale *= 1000;
        exponent += 1;
    }
    let value = ((bytes as f64 / scale as f64) * 10.0 + 0.5).floor() / 10.0;
    if value < 10.0 {
        format!("{:.1} {}", value, SI_UNITS[exponent])
    } else {
        format!("{:.0} {}", value, SI_UNITS[exponent])
    }
}
