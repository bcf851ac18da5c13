use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  Finished: {} (took {:.2?})", self.label, self.elapsed());
    }
}

pub const NO_VALUE: &str = "—";

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

/// Shorthand for large magnitudes: 402_000_000_000 → "402.00B", 1_200_000 → "1.20M".
pub fn fmt_compact(v: f64, decimals: usize) -> String {
    let (scaled, suffix) = match v.abs() {
        a if a >= 1e12 => (v / 1e12, "T"),
        a if a >= 1e9 => (v / 1e9, "B"),
        a if a >= 1e6 => (v / 1e6, "M"),
        a if a >= 1e3 => (v / 1e3, "K"),
        _ => (v, ""),
    };
    format!("{:.*}{}", decimals, scaled, suffix)
}

/// Share volume with separators; magnitudes past exact `i64` range fall back
/// to shorthand.
pub fn fmt_volume(v: Option<f64>) -> String {
    match v {
        Some(x) if x.abs() < 1e15 => fmt_number(x.round() as i64),
        Some(x) => fmt_compact(x, 2),
        None => NO_VALUE.to_string(),
    }
}

pub fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| format!("{:.*}", decimals, x))
        .unwrap_or_else(|| NO_VALUE.to_string())
}

pub fn fmt_opt_compact(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| fmt_compact(x, decimals))
        .unwrap_or_else(|| NO_VALUE.to_string())
}

/// Signed percentage: 6.38 → "+6.38%".
pub fn fmt_pct(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| format!("{:+.*}%", decimals, x))
        .unwrap_or_else(|| NO_VALUE.to_string())
}
