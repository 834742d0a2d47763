//! Small parsing and formatting helpers shared across modules.

use std::collections::HashSet;

/// Round a value to one decimal place (published temperatures and rates).
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Parse a setpoint offset from its textual form, preserving negative zero.
///
/// A configured `-0`/`-0.0` is semantically different from `0`: it pins the
/// band floor exactly at the current temperature while still reading as
/// "no downward allowance" in diagnostics. Plain `f64` parsing keeps the
/// sign bit, but values that arrive as strings are trimmed and checked
/// explicitly so `" -0 "` survives too.
pub fn parse_offset(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let parsed: f64 = trimmed.parse().ok()?;
    if parsed == 0.0 && trimmed.starts_with("-0") {
        return Some(-0.0);
    }
    Some(parsed)
}

/// Format an assist timer as `M:SS/M:SS` (elapsed over threshold).
pub fn format_timer(elapsed_seconds: f64, total_seconds: f64) -> String {
    let elapsed = elapsed_seconds.max(0.0) as u64;
    let total = total_seconds.max(0.0) as u64;
    let (em, es) = (elapsed / 60, elapsed % 60);
    let (tm, ts) = (total / 60, total % 60);
    format!("{}:{:02}/{}:{:02}", em, es, tm, ts)
}

/// Lowercase a string into an `a-z0-9_` slug, collapsing separator runs.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Derive a unique device id from a control entity reference.
///
/// Uses the final dot-separated segment, slugged; collisions get `_2`,
/// `_3`... suffixes in configuration order.
pub fn unique_device_id(entity: &str, used: &HashSet<String>) -> String {
    let base = slugify(entity.rsplit('.').next().unwrap_or(entity));
    let base = if base.is_empty() {
        "hp".to_string()
    } else {
        base
    };
    let mut candidate = base.clone();
    let mut counter = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", base, counter);
        counter += 1;
    }
    candidate
}

/// Derive a display name from a control entity reference.
pub fn device_name_from_entity(entity: &str) -> String {
    let raw = entity.rsplit('.').next().unwrap_or(entity).replace('_', " ");
    if raw.trim().is_empty() {
        return entity.to_string();
    }
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
