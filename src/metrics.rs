// SPDX-License-Identifier: MPL-2.0

//! # Derived Metrics
//!
//! Pure functions turning raw counts and timestamps into the numbers the
//! views display: hourly rates, LoRa airtime estimates, channel
//! utilization and smoothed series.
//!
//! ## Airtime Model
//!
//! Time-on-air follows the Semtech SX127x datasheet formula:
//!
//! ```text
//! Tsym      = 2^SF / BW
//! Tpreamble = (Npreamble + 4.25) * Tsym
//! Npayload  = 8 + max(ceil((8PL - 4SF + 28 + 16CRC - 20IH) / (4(SF - 2DE))) * CR, 0)
//! Tpacket   = Tpreamble + Npayload * Tsym
//! ```
//!
//! `CR` is the coding rate denominator (5 for 4/5 up to 8 for 4/8), `IH`
//! is 1 for implicit header mode and `DE` enables low data rate
//! optimisation, which the radio forces on when a symbol exceeds 16 ms.

use crate::api::types::{Bucket, BucketedStats};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Airtime Model
// ============================================================================

/// Radio parameters used to estimate per-packet airtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirtimeModel {
    /// Spreading factor, 6..=12
    pub spreading_factor: u8,
    /// Bandwidth in kHz (e.g. 125.0, 250.0, 62.5)
    pub bandwidth_khz: f64,
    /// Coding rate denominator, 5..=8
    pub coding_rate: u8,
    pub preamble_symbols: u16,
    pub explicit_header: bool,
    pub crc: bool,
    /// Payload size assumed when a packet's real length is unknown
    pub average_payload_bytes: u16,
}

impl Default for AirtimeModel {
    fn default() -> Self {
        Self {
            spreading_factor: 8,
            bandwidth_khz: 62.5,
            coding_rate: 8,
            preamble_symbols: 16,
            explicit_header: true,
            crc: true,
            average_payload_bytes: 64,
        }
    }
}

impl AirtimeModel {
    pub fn validate(&self) -> Result<()> {
        if !(6..=12).contains(&self.spreading_factor) {
            return Err(Error::Config(format!(
                "spreading_factor {} outside 6..=12",
                self.spreading_factor
            )));
        }
        if !(5..=8).contains(&self.coding_rate) {
            return Err(Error::Config(format!(
                "coding_rate {} outside 5..=8",
                self.coding_rate
            )));
        }
        if !(self.bandwidth_khz > 0.0) {
            return Err(Error::Config("bandwidth_khz must be positive".into()));
        }
        Ok(())
    }

    /// Duration of one symbol in milliseconds.
    pub fn symbol_time_ms(&self) -> f64 {
        2f64.powi(self.spreading_factor as i32) / self.bandwidth_khz
    }

    fn low_data_rate_optimize(&self) -> bool {
        self.symbol_time_ms() > 16.0
    }

    /// Airtime of a packet carrying the model's average payload.
    pub fn average_packet_ms(&self) -> f64 {
        lora_airtime_ms(self.average_payload_bytes as usize, self)
    }
}

/// Time-on-air in milliseconds for a payload of `payload_len` bytes.
pub fn lora_airtime_ms(payload_len: usize, model: &AirtimeModel) -> f64 {
    let sf = model.spreading_factor as f64;
    let t_sym = model.symbol_time_ms();
    let t_preamble = (model.preamble_symbols as f64 + 4.25) * t_sym;

    let crc = if model.crc { 1.0 } else { 0.0 };
    let ih = if model.explicit_header { 0.0 } else { 1.0 };
    let de = if model.low_data_rate_optimize() { 1.0 } else { 0.0 };

    let numerator = 8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0 * crc - 20.0 * ih;
    let denominator = 4.0 * (sf - 2.0 * de);
    let payload_symbols =
        8.0 + ((numerator / denominator).ceil() * model.coding_rate as f64).max(0.0);

    t_preamble + payload_symbols * t_sym
}

// ============================================================================
// Rates and Utilization
// ============================================================================

/// Events per hour over a window of `window_minutes`.
pub fn per_hour_rate(count: u64, window_minutes: f64) -> f64 {
    if window_minutes <= 0.0 {
        return 0.0;
    }
    count as f64 / (window_minutes / 60.0)
}

/// Percentage of `window_ms` spent on air by `packet_count` packets.
///
/// Capped at 100. Non-decreasing in `packet_count` for fixed airtime and window.
pub fn airtime_utilization(packet_count: u64, airtime_per_packet_ms: f64, window_ms: f64) -> f64 {
    if window_ms <= 0.0 || airtime_per_packet_ms <= 0.0 {
        return 0.0;
    }
    let busy = packet_count as f64 * airtime_per_packet_ms;
    (busy / window_ms * 100.0).min(100.0)
}

/// Utilization per bucket, counting received and transmitted packets.
///
/// Uses the backend's measured airtime for a bucket when present,
/// otherwise the model's average packet estimate.
pub fn bucket_utilization(stats: &BucketedStats, model: &AirtimeModel) -> Vec<f64> {
    let per_packet = model.average_packet_ms();
    stats
        .received
        .iter()
        .zip(stats.transmitted.iter())
        .map(|(rx, tx)| {
            let window_ms = (rx.end - rx.start) * 1000.0;
            let measured = rx.airtime_ms + tx.airtime_ms;
            if measured > 0.0 {
                if window_ms <= 0.0 {
                    0.0
                } else {
                    (measured / window_ms * 100.0).min(100.0)
                }
            } else {
                airtime_utilization(rx.count + tx.count, per_packet, window_ms)
            }
        })
        .collect()
}

/// Sum of bucket counts.
pub fn bucket_total(buckets: &[Bucket]) -> u64 {
    buckets.iter().map(|b| b.count).sum()
}

// ============================================================================
// Smoothing
// ============================================================================

/// Trailing simple moving average.
///
/// Output has the same length as the input; element `i` averages the last
/// `window` values up to and including `i` (fewer at the start, so the
/// first output equals the first input).
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, value) in values.iter().enumerate() {
        sum += value;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(start: f64, count: u64) -> Bucket {
        Bucket {
            start,
            end: start + 60.0,
            count,
            airtime_ms: 0.0,
        }
    }

    #[test]
    fn test_per_hour_rate() {
        assert_eq!(per_hour_rate(30, 30.0), 60.0);
        assert_eq!(per_hour_rate(5, 0.0), 0.0);
    }

    #[test]
    fn test_airtime_known_values() {
        // SF7 / 125 kHz / 4/5, 8 symbol preamble, 10 byte payload: 41.216 ms
        let model = AirtimeModel {
            spreading_factor: 7,
            bandwidth_khz: 125.0,
            coding_rate: 5,
            preamble_symbols: 8,
            explicit_header: true,
            crc: true,
            average_payload_bytes: 10,
        };
        assert!((lora_airtime_ms(10, &model) - 41.216).abs() < 0.01);

        // SF12 / 125 kHz triggers low data rate optimisation
        let slow = AirtimeModel {
            spreading_factor: 12,
            ..model
        };
        assert!(slow.symbol_time_ms() > 16.0);
        assert!((lora_airtime_ms(10, &slow) - 991.232).abs() < 0.01);
    }

    #[test]
    fn test_airtime_grows_with_payload() {
        let model = AirtimeModel::default();
        assert!(lora_airtime_ms(200, &model) > lora_airtime_ms(10, &model));
    }

    #[test]
    fn test_utilization_monotonic_in_count() {
        let mut last = 0.0;
        for count in 0..=600 {
            let u = airtime_utilization(count, 120.0, 60_000.0);
            assert!(u >= last);
            assert!(u <= 100.0);
            last = u;
        }
        // 500 packets of 120 ms fill a minute exactly.
        assert!((airtime_utilization(499, 120.0, 60_000.0) - 99.8).abs() < 1e-9);
        assert_eq!(airtime_utilization(500, 120.0, 60_000.0), 100.0);
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_moving_average_shape() {
        let values = [4.0, 8.0, 6.0, 2.0, 10.0];
        let smoothed = moving_average(&values, 3);
        assert_eq!(smoothed.len(), values.len());
        assert_eq!(smoothed[0], 4.0);
        assert_eq!(smoothed[1], 6.0);
        assert_eq!(smoothed[2], 6.0);
        assert!((smoothed[4] - 6.0).abs() < 1e-9);
        assert!(moving_average(&[], 3).is_empty());
    }

    #[test]
    fn test_bucket_utilization_prefers_measured_airtime() {
        let mut rx = bucket(0.0, 1);
        rx.airtime_ms = 6_000.0;
        let stats = BucketedStats {
            bucket_count: 2,
            time_range_minutes: 2,
            received: vec![rx, bucket(60.0, 0)],
            transmitted: vec![bucket(0.0, 0), bucket(60.0, 0)],
            forwarded: vec![bucket(0.0, 0), bucket(60.0, 0)],
            dropped: vec![bucket(0.0, 0), bucket(60.0, 0)],
        };
        let series = bucket_utilization(&stats, &AirtimeModel::default());
        assert_eq!(series.len(), 2);
        assert!((series[0] - 10.0).abs() < 1e-9);
        assert_eq!(series[1], 0.0);
    }
}
