// SPDX-License-Identifier: MPL-2.0

//! Rolling CPU / memory history
//!
//! A bounded ring buffer of resource samples. Unlike the rest of the state
//! it is never replaced by a poll; it accumulates until the oldest samples
//! are evicted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceDataPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
}

/// Bounded, time-ordered history of [`ResourceDataPoint`]s.
///
/// Holds at most `max_slots` points with strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHistory {
    points: VecDeque<ResourceDataPoint>,
    max_slots: usize,
    min_spacing: Duration,
}

impl Default for ResourceHistory {
    fn default() -> Self {
        Self::new(20, Duration::seconds(1))
    }
}

impl ResourceHistory {
    pub fn new(max_slots: usize, min_spacing: Duration) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            points: VecDeque::with_capacity(max_slots),
            max_slots,
            min_spacing,
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Returns `false` and leaves the buffer untouched when the sample is
    /// closer than `min_spacing` to the newest point or older than it. A
    /// hardware poll firing twice for the same tick lands here.
    pub fn push(&mut self, point: ResourceDataPoint) -> bool {
        if let Some(last) = self.points.back() {
            // An overflowing spacing puts the next slot out of reach.
            let too_close = match last.timestamp.checked_add_signed(self.min_spacing) {
                Some(next) => point.timestamp < next,
                None => true,
            };
            if too_close || point.timestamp <= last.timestamp {
                log::debug!(
                    "Dropping resource sample at {} (newest is {})",
                    point.timestamp,
                    last.timestamp
                );
                return false;
            }
        }
        self.points.push_back(point);
        while self.points.len() > self.max_slots {
            self.points.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn latest(&self) -> Option<&ResourceDataPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDataPoint> {
        self.points.iter()
    }

    pub fn cpu_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.cpu).collect()
    }

    pub fn memory_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.memory).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(base: DateTime<Utc>, i: i64) -> ResourceDataPoint {
        ResourceDataPoint {
            timestamp: base + Duration::seconds(5 * i),
            cpu: i as f64,
            memory: 50.0,
        }
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let base = Utc::now();
        let mut history = ResourceHistory::new(20, Duration::seconds(1));
        for i in 1..=21 {
            assert!(history.push(point(base, i)));
        }
        assert_eq!(history.len(), 20);
        let cpus = history.cpu_series();
        let expected: Vec<f64> = (2..=21).map(|i| i as f64).collect();
        assert_eq!(cpus, expected);
    }

    #[test]
    fn test_never_exceeds_max_slots() {
        let base = Utc::now();
        for max in [1, 3, 7] {
            let mut history = ResourceHistory::new(max, Duration::zero());
            for i in 0..50 {
                history.push(point(base, i));
                assert!(history.len() <= max);
            }
        }
    }

    #[test]
    fn test_rejects_close_and_out_of_order_samples() {
        let base = Utc::now();
        let mut history = ResourceHistory::new(10, Duration::seconds(2));
        assert!(history.push(point(base, 1)));

        let mut twin = point(base, 1);
        twin.timestamp += Duration::milliseconds(500);
        assert!(!history.push(twin));
        assert!(!history.push(point(base, 0)));
        assert_eq!(history.len(), 1);

        assert!(history.push(point(base, 2)));
        let stamps: Vec<_> = history.iter().map(|p| p.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_huge_spacing_rejects_instead_of_overflowing() {
        let base = Utc::now();
        let mut history = ResourceHistory::new(5, Duration::milliseconds(9_000_000_000_000_000));
        assert!(history.push(point(base, 0)));
        assert!(!history.push(point(base, 1)));
        assert_eq!(history.len(), 1);
    }
}
