// SPDX-License-Identifier: MPL-2.0

//! # Terminal Rendering
//!
//! Turns state slices into text blocks. Nothing here fetches or mutates;
//! every function takes what it draws as arguments.
//!
//! ## Colors
//!
//! Gauges use the same thresholds throughout:
//! - **Green**: below 50%
//! - **Yellow**: 50-80%
//! - **Red**: above 80%
//!
//! Colors are emitted as 24-bit ANSI escapes, scaled by the brightness
//! preference. [`Theme::plain`] disables escapes entirely.

use crate::api::types::{BucketedStats, LogEntry, Packet, Stats, to_datetime};
use crate::metrics::{self, AirtimeModel};
use crate::preferences::{Background, Preferences};
use crate::state::{AppState, FlashEvent, ResourceHistory, Slice};
use chrono::{Local, Utc};
use std::fmt::Write;

type Rgb = (f64, f64, f64);

const GREEN: Rgb = (0.4, 0.9, 0.4);
const YELLOW: Rgb = (0.9, 0.9, 0.4);
const RED: Rgb = (0.9, 0.4, 0.4);
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

// ============================================================================
// Theme
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    accent: Rgb,
    text: Rgb,
    muted: Rgb,
    brightness: f64,
    color: bool,
}

impl Theme {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let (accent, text, muted) = match prefs.background {
            Background::Default => ((0.3, 0.7, 1.0), (0.95, 0.95, 0.95), (0.6, 0.6, 0.6)),
            Background::Dark => ((0.5, 0.5, 0.9), (0.8, 0.8, 0.8), (0.45, 0.45, 0.45)),
            Background::Mesh => ((0.2, 0.9, 0.7), (0.9, 1.0, 0.95), (0.5, 0.65, 0.6)),
            Background::Topo => ((0.9, 0.7, 0.3), (0.95, 0.92, 0.85), (0.65, 0.6, 0.5)),
            Background::Aurora => ((0.7, 0.4, 1.0), (0.92, 0.9, 1.0), (0.6, 0.55, 0.7)),
            Background::Plain => return Self::plain(),
        };
        Self {
            accent,
            text,
            muted,
            brightness: prefs.brightness as f64 / 100.0,
            color: true,
        }
    }

    /// No escape codes at all; used for pipes and tests.
    pub fn plain() -> Self {
        Self {
            accent: (1.0, 1.0, 1.0),
            text: (1.0, 1.0, 1.0),
            muted: (1.0, 1.0, 1.0),
            brightness: 1.0,
            color: false,
        }
    }

    fn paint(&self, rgb: Rgb, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        let scale = |c: f64| (c * self.brightness * 255.0).round().clamp(0.0, 255.0) as u8;
        format!(
            "\x1b[38;2;{};{};{}m{}\x1b[0m",
            scale(rgb.0),
            scale(rgb.1),
            scale(rgb.2),
            text
        )
    }

    fn heading(&self, text: &str) -> String {
        self.paint(self.accent, text)
    }

    fn label(&self, text: &str) -> String {
        self.paint(self.muted, text)
    }

    fn value(&self, text: &str) -> String {
        self.paint(self.text, text)
    }
}

fn level_color(percentage: f64) -> Rgb {
    if percentage < 50.0 {
        GREEN
    } else if percentage < 80.0 {
        YELLOW
    } else {
        RED
    }
}

// ============================================================================
// Primitives
// ============================================================================

/// `[######----]  62.0%`
pub fn progress_bar(theme: &Theme, percentage: f64, width: usize) -> String {
    let clamped = percentage.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(width - filled));
    format!(
        "[{}] {:>5.1}%",
        theme.paint(level_color(clamped), &bar),
        percentage
    )
}

/// One character per value, scaled between the series minimum and maximum.
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span = max - min;
    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                SPARKS[0]
            } else {
                let idx = ((v - min) / span * (SPARKS.len() - 1) as f64).round() as usize;
                SPARKS[idx.min(SPARKS.len() - 1)]
            }
        })
        .collect()
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {}s", seconds % 60)
    }
}

pub fn format_time(ts: f64) -> String {
    to_datetime(ts)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| String::from("--:--:--"))
}

// ============================================================================
// Panels
// ============================================================================

/// Node summary card with lifetime hourly rates.
pub fn stats_card(theme: &Theme, stats: &Stats) -> String {
    let uptime_minutes = stats.uptime_seconds as f64 / 60.0;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}  {} {}  {} {}",
        theme.heading(&stats.node_name),
        theme.label(stats.version.as_deref().unwrap_or("")),
        theme.label("mode"),
        theme.value(&stats.mode),
        theme.label("up"),
        theme.value(&format_uptime(stats.uptime_seconds)),
    );
    for (name, count) in [
        ("Received", stats.rx_count),
        ("Forwarded", stats.forwarded_count),
        ("Dropped", stats.dropped_count),
        ("Transmitted", stats.tx_count),
        ("Duplicates", stats.duplicate_count),
    ] {
        let rate = metrics::per_hour_rate(count, uptime_minutes);
        let _ = writeln!(
            out,
            "  {:<12} {:>8}  {}",
            theme.label(name),
            theme.value(&count.to_string()),
            theme.label(&format!("{rate:.1}/h")),
        );
    }
    let radio = &stats.config;
    let _ = writeln!(
        out,
        "  {} {:.3} MHz  SF{}  BW{} kHz  CR4/{}  {} dBm",
        theme.label("Radio"),
        radio.frequency_mhz,
        radio.spreading_factor,
        radio.bandwidth_khz,
        radio.coding_rate,
        radio.tx_power_dbm
    );
    if stats.duty_cycle.enabled {
        let _ = writeln!(
            out,
            "  {} {} of {:.1}%",
            theme.label("Duty cycle"),
            progress_bar(theme, stats.duty_cycle.current_airtime_percent, 20),
            stats.duty_cycle.max_airtime_percent
        );
    } else {
        let _ = writeln!(out, "  {} off", theme.label("Duty cycle"));
    }
    out
}

/// Neighbors sorted by most recently heard.
pub fn neighbor_table(theme: &Theme, stats: &Stats, limit: usize) -> String {
    let mut neighbors: Vec<_> = stats.neighbors.iter().collect();
    neighbors.sort_by(|a, b| b.1.last_seen.total_cmp(&a.1.last_seen));
    let mut out = theme.heading(&format!("Neighbors ({})", neighbors.len()));
    out.push('\n');
    for (key, n) in neighbors.into_iter().take(limit) {
        let short: String = key.chars().take(8).collect();
        let _ = writeln!(
            out,
            "  {:<8} {:<16} {:>5} dBm {:>6} dB  {}",
            short,
            n.node_name.as_deref().unwrap_or("?"),
            n.rssi.map_or("-".to_string(), |r| r.to_string()),
            n.snr.map_or("-".to_string(), |s| format!("{s:.1}")),
            theme.label(&format_time(n.last_seen)),
        );
    }
    out
}

pub fn packet_table(theme: &Theme, packets: &[Packet], limit: usize) -> String {
    let mut out = theme.heading("Recent packets");
    out.push('\n');
    if packets.is_empty() {
        let _ = writeln!(out, "  {}", theme.label("no packets yet"));
        return out;
    }
    for p in packets.iter().take(limit) {
        let status = if p.transmitted {
            theme.paint(GREEN, "TX")
        } else if p.is_duplicate {
            theme.paint(YELLOW, "DUP")
        } else if let Some(reason) = &p.drop_reason {
            theme.paint(RED, &format!("DROP {reason}"))
        } else {
            theme.label("RX")
        };
        let _ = writeln!(
            out,
            "  {} {:<9} {:<16} {:>4} dBm {:>6.2} dB {:>4}B  {}",
            theme.label(&format_time(p.timestamp)),
            p.type_name(),
            p.route_name(),
            p.rssi,
            p.snr,
            p.length,
            status
        );
    }
    out
}

pub fn log_lines(theme: &Theme, logs: &[LogEntry], limit: usize) -> String {
    let mut out = theme.heading("Logs");
    out.push('\n');
    let start = logs.len().saturating_sub(limit);
    for entry in &logs[start..] {
        let level = match entry.level.as_str() {
            "ERROR" | "CRITICAL" => theme.paint(RED, &entry.level),
            "WARNING" => theme.paint(YELLOW, &entry.level),
            _ => theme.label(&entry.level),
        };
        let _ = writeln!(
            out,
            "  {} {:<8} {}",
            theme.label(&format_time(entry.timestamp)),
            level,
            entry.message
        );
    }
    out
}

/// Latest CPU/memory gauges plus smoothed history sparklines.
pub fn resource_panel(theme: &Theme, history: &ResourceHistory, smoothing: usize) -> String {
    let mut out = theme.heading("Resources");
    out.push('\n');
    let Some(latest) = history.latest() else {
        let _ = writeln!(out, "  {}", theme.label("waiting for samples"));
        return out;
    };
    let cpu = metrics::moving_average(&history.cpu_series(), smoothing);
    let memory = metrics::moving_average(&history.memory_series(), smoothing);
    let _ = writeln!(
        out,
        "  {:<4} {}  {}",
        theme.label("CPU"),
        progress_bar(theme, latest.cpu, 20),
        sparkline(&cpu)
    );
    let _ = writeln!(
        out,
        "  {:<4} {}  {}",
        theme.label("RAM"),
        progress_bar(theme, latest.memory, 20),
        sparkline(&memory)
    );
    let _ = writeln!(
        out,
        "  {}",
        theme.label(&format!("{}/{} samples", history.len(), history.max_slots()))
    );
    out
}

/// Histogram summary: totals, hourly rates and per-bucket utilization.
pub fn bucket_chart(
    theme: &Theme,
    stats: &BucketedStats,
    model: &AirtimeModel,
    smoothing: usize,
) -> String {
    let mut out = theme.heading(&format!(
        "Last {} min in {} buckets",
        stats.time_range_minutes, stats.bucket_count
    ));
    out.push('\n');
    for (name, series) in stats.series() {
        let counts: Vec<f64> = series.iter().map(|b| b.count as f64).collect();
        let total = metrics::bucket_total(series);
        let rate = metrics::per_hour_rate(total, stats.time_range_minutes as f64);
        let _ = writeln!(
            out,
            "  {:<12} {:>7} {:>8}  {}",
            theme.label(name),
            theme.value(&total.to_string()),
            theme.label(&format!("{rate:.1}/h")),
            sparkline(&counts)
        );
    }
    let utilization = metrics::moving_average(&metrics::bucket_utilization(stats, model), smoothing);
    let peak = utilization.iter().cloned().fold(0.0, f64::max);
    let _ = writeln!(
        out,
        "  {:<12} {}  {}",
        theme.label("Airtime"),
        progress_bar(theme, peak, 20),
        sparkline(&utilization)
    );
    out
}

pub fn error_banner(theme: &Theme, state: &AppState) -> Option<String> {
    if state.errors.is_empty() {
        return None;
    }
    let mut errors: Vec<_> = state.errors.iter().collect();
    errors.sort_by_key(|(slice, _)| slice.name());
    let mut out = String::new();
    for (slice, error) in errors {
        let _ = writeln!(
            out,
            "{}",
            theme.paint(RED, &format!("! {}: {} (showing last data)", slice.name(), error))
        );
    }
    Some(out)
}

/// Marker shown next to the header for a couple of seconds after fresh data.
pub fn flash_marker(theme: &Theme, flash: Option<&FlashEvent>, hold_secs: i64) -> String {
    match flash {
        Some(f) if (Utc::now() - f.at).num_seconds() < hold_secs => {
            theme.paint(GREEN, &format!("● {}", f.slice.name()))
        }
        _ => String::from(" "),
    }
}

pub fn last_updated(theme: &Theme, state: &AppState, slice: Slice) -> String {
    match state.updated_at.get(&slice) {
        Some(at) => theme.label(&format!(
            "updated {}",
            at.with_timezone(&Local).format("%H:%M:%S")
        )),
        None => theme.label("loading…"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Bucket;

    #[test]
    fn test_progress_bar_clamps() {
        let theme = Theme::plain();
        assert_eq!(progress_bar(&theme, 50.0, 10), "[#####-----]  50.0%");
        assert_eq!(progress_bar(&theme, 140.0, 4), "[####] 140.0%");
        assert_eq!(progress_bar(&theme, -3.0, 4), "[----]  -3.0%");
    }

    #[test]
    fn test_sparkline_scales() {
        assert_eq!(sparkline(&[0.0, 7.0]), "▁█");
        assert_eq!(sparkline(&[3.0, 3.0, 3.0]), "▁▁▁");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m 59s");
        assert_eq!(format_uptime(3_720), "1h 2m");
        assert_eq!(format_uptime(90_000), "1d 1h 0m");
    }

    #[test]
    fn test_brightness_scales_colors() {
        let dim = Theme::from_preferences(&Preferences {
            background: Background::Default,
            brightness: 0,
        });
        assert!(dim.paint(RED, "x").contains("38;2;0;0;0m"));
        assert_eq!(
            Theme::from_preferences(&Preferences {
                background: Background::Plain,
                brightness: 50,
            }),
            Theme::plain()
        );
    }

    #[test]
    fn test_error_banner_lists_slices() {
        let mut state = AppState::default();
        assert!(error_banner(&Theme::plain(), &state).is_none());
        state.errors.insert(Slice::Logs, "timeout".into());
        let banner = error_banner(&Theme::plain(), &state).unwrap();
        assert!(banner.contains("logs: timeout"));
    }

    #[test]
    fn test_bucket_chart_totals() {
        let b = |start: f64, count: u64| Bucket {
            start,
            end: start + 300.0,
            count,
            airtime_ms: 0.0,
        };
        let series = vec![b(0.0, 3), b(300.0, 9)];
        let stats = BucketedStats {
            bucket_count: 2,
            time_range_minutes: 10,
            received: series.clone(),
            forwarded: series.clone(),
            dropped: series.clone(),
            transmitted: series,
        };
        let chart = bucket_chart(&Theme::plain(), &stats, &AirtimeModel::default(), 3);
        assert!(chart.contains("received"));
        assert!(chart.contains("72.0/h"));
    }
}
