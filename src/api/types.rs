// SPDX-License-Identifier: MPL-2.0

//! Response and request bodies of the repeater HTTP API.
//!
//! Timestamps are Unix seconds as floats, the way the backend emits them.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Envelope
// ============================================================================

/// `{ success, data?, error? }` wrapper used by most endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap into the payload, turning `success: false` into [`Error::Api`].
    pub fn into_result(self, endpoint: &'static str) -> Result<T> {
        if !self.success {
            return Err(Error::Api(
                self.error
                    .unwrap_or_else(|| format!("{endpoint} reported failure")),
            ));
        }
        self.data.ok_or(Error::MissingData(endpoint))
    }
}

/// Acknowledgement returned by the control endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ack {
    pub message: Option<String>,
}

impl Ack {
    /// Control endpoints answer with either a plain string or `{ "message": ... }`.
    pub fn from_data(data: &serde_json::Value) -> Self {
        let message = data
            .as_str()
            .or_else(|| data.get("message").and_then(|m| m.as_str()))
            .map(String::from);
        Self { message }
    }
}

pub fn to_datetime(ts: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((ts * 1000.0) as i64)
}

// ============================================================================
// Stats
// ============================================================================

/// Node snapshot from `/api/stats`. Replaced wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub node_name: String,
    pub public_key: Option<String>,
    pub version: Option<String>,
    pub mode: String,
    pub uptime_seconds: u64,
    pub rx_count: u64,
    pub forwarded_count: u64,
    pub dropped_count: u64,
    pub tx_count: u64,
    pub duplicate_count: u64,
    pub config: RadioSettings,
    pub duty_cycle: DutyCycle,
    pub neighbors: HashMap<String, Neighbor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    pub frequency_mhz: f64,
    pub spreading_factor: u8,
    pub bandwidth_khz: f64,
    pub coding_rate: u8,
    pub tx_power_dbm: i8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyCycle {
    pub enabled: bool,
    pub max_airtime_percent: f64,
    pub current_airtime_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Neighbor {
    pub node_name: Option<String>,
    pub last_seen: f64,
    pub rssi: Option<i16>,
    pub snr: Option<f32>,
    pub advert_count: u32,
}

// ============================================================================
// Packets
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Packet {
    pub timestamp: f64,
    pub packet_hash: String,
    #[serde(rename = "type")]
    pub packet_type: u8,
    pub route: u8,
    pub rssi: i16,
    pub snr: f32,
    pub length: usize,
    pub transmitted: bool,
    pub is_duplicate: bool,
    pub drop_reason: Option<String>,
    pub score: Option<f64>,
    pub tx_delay_ms: Option<f64>,
}

impl Packet {
    pub fn type_name(&self) -> &'static str {
        match self.packet_type {
            0x00 => "REQ",
            0x01 => "RESPONSE",
            0x02 => "TXT_MSG",
            0x03 => "ACK",
            0x04 => "ADVERT",
            0x05 => "GRP_TXT",
            0x06 => "GRP_DATA",
            0x07 => "ANON_REQ",
            0x08 => "PATH",
            0x09 => "TRACE",
            _ => "UNKNOWN",
        }
    }

    pub fn route_name(&self) -> &'static str {
        match self.route {
            0x00 => "TRANSPORT_FLOOD",
            0x01 => "FLOOD",
            0x02 => "DIRECT",
            0x03 => "TRANSPORT_DIRECT",
            _ => "UNKNOWN",
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.drop_reason.is_some()
    }
}

/// Query parameters for `/api/filtered_packets`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketFilter {
    pub packet_type: Option<u8>,
    pub route: Option<u8>,
    pub start_timestamp: Option<f64>,
    pub end_timestamp: Option<f64>,
    pub limit: Option<u32>,
}

impl PacketFilter {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(t) = self.packet_type {
            query.push(("type", t.to_string()));
        }
        if let Some(r) = self.route {
            query.push(("route", r.to_string()));
        }
        if let Some(s) = self.start_timestamp {
            query.push(("start_timestamp", s.to_string()));
        }
        if let Some(e) = self.end_timestamp {
            query.push(("end_timestamp", e.to_string()));
        }
        if let Some(l) = self.limit {
            query.push(("limit", l.to_string()));
        }
        query
    }
}

// ============================================================================
// Graph data
// ============================================================================

/// One named series of `[timestamp, value]` points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Series {
    pub name: String,
    pub data: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphData {
    pub start_time: f64,
    pub end_time: f64,
    pub series: Vec<Series>,
}

// ============================================================================
// Bucketed stats
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: f64,
    pub end: f64,
    pub count: u64,
    #[serde(default)]
    pub airtime_ms: f64,
}

/// Time-windowed histogram from `/api/bucketed_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketedStats {
    pub bucket_count: usize,
    pub time_range_minutes: u32,
    pub received: Vec<Bucket>,
    pub forwarded: Vec<Bucket>,
    pub dropped: Vec<Bucket>,
    pub transmitted: Vec<Bucket>,
}

impl BucketedStats {
    /// Check every series has `requested` buckets in ascending time order.
    pub fn validate(&self, requested: usize) -> Result<()> {
        for (name, series) in self.series() {
            if series.len() != requested {
                return Err(Error::InvalidBuckets(format!(
                    "{name}: expected {requested} buckets, got {}",
                    series.len()
                )));
            }
            if series.windows(2).any(|w| w[1].start <= w[0].start) {
                return Err(Error::InvalidBuckets(format!("{name}: buckets out of order")));
            }
        }
        Ok(())
    }

    pub fn series(&self) -> [(&'static str, &[Bucket]); 4] {
        [
            ("received", &self.received),
            ("forwarded", &self.forwarded),
            ("dropped", &self.dropped),
            ("transmitted", &self.transmitted),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilizationStats {
    pub time_range_minutes: u32,
    pub rx_airtime_ms: f64,
    pub tx_airtime_ms: f64,
    pub packet_count: u64,
    pub utilization_percent: f64,
}

// ============================================================================
// Hardware, noise floor, logs
// ============================================================================

/// Bare object from `/api/hardware_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareStats {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub load_average: Vec<f64>,
    pub temperature_c: Option<f64>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseFloorSample {
    pub timestamp: f64,
    pub noise_floor_dbm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFloorStats {
    pub count: u64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    pub timestamp: f64,
    pub level: String,
    pub message: String,
}

// ============================================================================
// Control
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioPreset {
    pub name: String,
    pub frequency_mhz: f64,
    pub spreading_factor: u8,
    pub bandwidth_khz: f64,
    pub coding_rate: u8,
}

/// Partial radio configuration change; unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadioConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_mhz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreading_factor: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_khz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coding_rate: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_power_dbm: Option<i8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Forward,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_failure_carries_error() {
        let env: Envelope<Stats> =
            serde_json::from_str(r#"{"success": false, "error": "radio busy"}"#).unwrap();
        match env.into_result("stats") {
            Err(Error::Api(msg)) => assert_eq!(msg, "radio busy"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_envelope_success_without_data() {
        let env: Envelope<Vec<Packet>> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(matches!(
            env.into_result("recent_packets"),
            Err(Error::MissingData("recent_packets"))
        ));
    }

    #[test]
    fn test_envelope_payload_needs_no_default() {
        #[derive(Debug, Deserialize)]
        struct Reading {
            value: f64,
        }

        let env: Envelope<Reading> =
            serde_json::from_str(r#"{"success": true, "data": {"value": -112.5}}"#).unwrap();
        assert_eq!(env.into_result("reading").unwrap().value, -112.5);

        let env: Envelope<Reading> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(env.data.is_none());
        assert!(env.error.is_none());
    }

    #[test]
    fn test_bucket_validation() {
        let b = |start: f64| Bucket {
            start,
            end: start + 60.0,
            count: 1,
            airtime_ms: 0.0,
        };
        let mut stats = BucketedStats {
            bucket_count: 2,
            time_range_minutes: 2,
            received: vec![b(0.0), b(60.0)],
            forwarded: vec![b(0.0), b(60.0)],
            dropped: vec![b(0.0), b(60.0)],
            transmitted: vec![b(0.0), b(60.0)],
        };
        assert!(stats.validate(2).is_ok());
        assert!(stats.validate(3).is_err());

        stats.dropped.swap(0, 1);
        assert!(matches!(stats.validate(2), Err(Error::InvalidBuckets(_))));
    }

    #[test]
    fn test_filter_query_skips_unset() {
        let filter = PacketFilter {
            packet_type: Some(4),
            limit: Some(10),
            ..Default::default()
        };
        assert_eq!(
            filter.query(),
            vec![("type", "4".to_string()), ("limit", "10".to_string())]
        );
    }

    #[test]
    fn test_packet_names() {
        let packet: Packet =
            serde_json::from_str(r#"{"type": 4, "route": 1, "rssi": -90, "snr": 7.5}"#).unwrap();
        assert_eq!(packet.type_name(), "ADVERT");
        assert_eq!(packet.route_name(), "FLOOD");
        assert!(!packet.is_dropped());
    }
}
