/// Human-readable label for a span of `seconds`.
///
/// Picks the largest unit that keeps the number readable: `ns`, `us`, `ms`,
/// seconds with two decimals below 10s and one decimal below a minute, then
/// whole minutes or hours followed by the whole remainder in the next unit
/// down (`"1m 30s"`, `"2h 5m"`). The unit is chosen after rounding to its
/// displayed precision, so a value never prints as the next unit's bound
/// (`0.9996` is `"1.00s"`, not `"1000ms"`). Anything within `f64::EPSILON`
/// of zero is `"0"`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() {
        return format!("{seconds}");
    }
    if seconds.abs() < f64::EPSILON {
        return "0".to_string();
    }

    let ns = (seconds * 1e9).round();
    if ns < 1e3 {
        return format!("{ns:.0}ns");
    }
    let us = (seconds * 1e6).round();
    if us < 1e3 {
        return format!("{us:.0}us");
    }
    let ms = (seconds * 1e3).round();
    if ms < 1e3 {
        return format!("{ms:.0}ms");
    }
    let centis = (seconds * 100.0).round();
    if centis < 1e3 {
        return format!("{:.2}s", centis / 100.0);
    }
    let decis = (seconds * 10.0).round();
    if decis < 600.0 {
        return format!("{:.1}s", decis / 10.0);
    }
    let secs = seconds.round();
    if secs < 3600.0 {
        return whole_with_remainder(secs, 60.0, "m", "s");
    }
    whole_with_remainder((seconds / 60.0).round(), 60.0, "h", "m")
}

/// `count` of the smaller unit as `"<whole><unit> <rest><next>"`, omitting a
/// zero remainder.
fn whole_with_remainder(count: f64, per_unit: f64, suffix: &str, next_suffix: &str) -> String {
    let whole = (count / per_unit).floor();
    let rest = count - whole * per_unit;
    if rest >= 1.0 {
        format!("{whole:.0}{suffix} {rest:.0}{next_suffix}")
    } else {
        format!("{whole:.0}{suffix}")
    }
}
