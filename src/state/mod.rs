// SPDX-License-Identifier: MPL-2.0

//! # Application State
//!
//! All polled server state lives in one [`AppState`] value. It is never
//! mutated directly: pollers produce [`Action`]s and [`reduce`] folds them
//! into a new state. The [`Store`] owns the current value and notifies
//! subscribers.
//!
//! ## Ordering
//!
//! Every poll result carries the sequence number its request was issued
//! with. The reducer remembers the last applied number per [`Slice`] and
//! discards anything older, so a slow response can never overwrite a
//! newer one.
//!
//! ## Failures
//!
//! A failed poll records its error string for the slice and leaves the
//! last good data in place.

pub mod history;
pub mod store;

pub use history::{ResourceDataPoint, ResourceHistory};
pub use store::{Selector, Store};

use crate::api::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Independently polled pieces of server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slice {
    Stats,
    Packets,
    Logs,
    Bucketed,
    Utilization,
    Hardware,
    NoiseFloor,
    PacketTypeGraph,
    MetricsGraph,
}

impl Slice {
    pub fn name(&self) -> &'static str {
        match self {
            Slice::Stats => "stats",
            Slice::Packets => "packets",
            Slice::Logs => "logs",
            Slice::Bucketed => "bucketed stats",
            Slice::Utilization => "utilization",
            Slice::Hardware => "hardware",
            Slice::NoiseFloor => "noise floor",
            Slice::PacketTypeGraph => "packet types",
            Slice::MetricsGraph => "metrics graph",
        }
    }
}

/// A successful poll result.
#[derive(Debug, Clone)]
pub enum Payload {
    Stats(Stats),
    Packets(Vec<Packet>),
    Logs(Vec<LogEntry>),
    Bucketed(BucketedStats),
    Utilization(UtilizationStats),
    Hardware(HardwareStats),
    NoiseFloor(Vec<NoiseFloorSample>),
    PacketTypeGraph(GraphData),
    MetricsGraph(GraphData),
}

impl Payload {
    pub fn slice(&self) -> Slice {
        match self {
            Payload::Stats(_) => Slice::Stats,
            Payload::Packets(_) => Slice::Packets,
            Payload::Logs(_) => Slice::Logs,
            Payload::Bucketed(_) => Slice::Bucketed,
            Payload::Utilization(_) => Slice::Utilization,
            Payload::Hardware(_) => Slice::Hardware,
            Payload::NoiseFloor(_) => Slice::NoiseFloor,
            Payload::PacketTypeGraph(_) => Slice::PacketTypeGraph,
            Payload::MetricsGraph(_) => Slice::MetricsGraph,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Loaded {
        payload: Payload,
        seq: u64,
        at: DateTime<Utc>,
    },
    Failed {
        slice: Slice,
        error: String,
        seq: u64,
    },
    ResourceSample(ResourceDataPoint),
    ClearError(Slice),
}

/// Transient pulse marking that fresh data arrived for a slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashEvent {
    pub slice: Slice,
    /// Increments on every flash, so two flashes never compare equal.
    pub id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub stats: Option<Stats>,
    pub packets: Vec<Packet>,
    pub logs: Vec<LogEntry>,
    pub bucketed: Option<BucketedStats>,
    pub utilization: Option<UtilizationStats>,
    pub hardware: Option<HardwareStats>,
    pub noise_floor: Vec<NoiseFloorSample>,
    pub packet_type_graph: Option<GraphData>,
    pub metrics_graph: Option<GraphData>,
    pub resource_history: ResourceHistory,

    pub errors: HashMap<Slice, String>,
    pub updated_at: HashMap<Slice, DateTime<Utc>>,
    pub flash: Option<FlashEvent>,

    last_seq: HashMap<Slice, u64>,
    /// Bumped on every accepted action.
    revision: u64,
}

impl AppState {
    pub fn with_history(resource_history: ResourceHistory) -> Self {
        Self {
            resource_history,
            ..Default::default()
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn error(&self, slice: Slice) -> Option<&str> {
        self.errors.get(&slice).map(String::as_str)
    }

    /// Whether a result issued with `seq` for `slice` is still current.
    fn is_fresh(&self, slice: Slice, seq: u64) -> bool {
        self.last_seq.get(&slice).is_none_or(|&last| seq > last)
    }

    fn flash(&mut self, slice: Slice, at: DateTime<Utc>) {
        let id = self.flash.map_or(1, |f| f.id + 1);
        self.flash = Some(FlashEvent { slice, id, at });
    }
}

/// Fold `action` into `state`.
///
/// Stale results are dropped without touching the state, including its
/// revision.
pub fn reduce(mut state: AppState, action: Action) -> AppState {
    match action {
        Action::Loaded { payload, seq, at } => {
            let slice = payload.slice();
            if !state.is_fresh(slice, seq) {
                log::debug!("Discarding stale {} response #{seq}", slice.name());
                return state;
            }
            state.last_seq.insert(slice, seq);
            state.errors.remove(&slice);
            state.updated_at.insert(slice, at);
            match payload {
                Payload::Stats(stats) => state.stats = Some(stats),
                Payload::Packets(packets) => state.packets = packets,
                Payload::Logs(logs) => state.logs = logs,
                Payload::Bucketed(bucketed) => state.bucketed = Some(bucketed),
                Payload::Utilization(util) => state.utilization = Some(util),
                Payload::Hardware(hardware) => {
                    let timestamp = hardware
                        .timestamp
                        .and_then(to_datetime)
                        .unwrap_or(at);
                    state.resource_history.push(ResourceDataPoint {
                        timestamp,
                        cpu: hardware.cpu_percent,
                        memory: hardware.memory_percent,
                    });
                    state.hardware = Some(hardware);
                }
                Payload::NoiseFloor(samples) => state.noise_floor = samples,
                Payload::PacketTypeGraph(graph) => state.packet_type_graph = Some(graph),
                Payload::MetricsGraph(graph) => state.metrics_graph = Some(graph),
            }
            state.flash(slice, at);
        }
        Action::Failed { slice, error, seq } => {
            if !state.is_fresh(slice, seq) {
                log::debug!("Discarding stale {} failure #{seq}", slice.name());
                return state;
            }
            state.last_seq.insert(slice, seq);
            state.errors.insert(slice, error);
        }
        Action::ResourceSample(point) => {
            if !state.resource_history.push(point) {
                return state;
            }
        }
        Action::ClearError(slice) => {
            if state.errors.remove(&slice).is_none() {
                return state;
            }
        }
    }
    state.revision += 1;
    state
}
