use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// Current wall-clock time in epoch seconds.
pub fn now_secs() -> i64 {
    now_ms() / 1000
}

/// Parse a provider timestamp of the form `"1712345678.000100"` (seconds with
/// an optional fractional part) into epoch milliseconds.
pub fn fractional_secs_to_ms(raw: &str) -> Option<i64> {
    let (secs, frac) = match raw.split_once('.') {
        Some((s, f)) => (s, f),
        None => (raw, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let millis = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(3).collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        format!("{digits:0<3}").parse::<i64>().ok()?
    };
    secs.checked_mul(1000)?.checked_add(millis)
}
