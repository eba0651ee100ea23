//! Last-known device readings.
//!
//! Shared between the transport's receive task (writes) and query/control
//! calls (reads and resets). The lock is synchronous and never held across an
//! `.await`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::device::{DeviceKind, SemanticState, READING_UNKNOWN};

/// Last observed value for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceReading {
    pub device: DeviceKind,
    pub value: i64,
    /// `None` until the first telemetry message arrives.
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeviceReading {
    fn unknown(device: DeviceKind) -> Self {
        Self {
            device,
            value: READING_UNKNOWN,
            updated_at: None,
        }
    }

    pub fn state(&self) -> SemanticState {
        SemanticState::from_reading(self.device, self.value)
    }
}

/// Mutex-guarded map of device to last reading, pre-seeded to unknown.
#[derive(Debug)]
pub struct ReadingStore {
    readings: Mutex<BTreeMap<DeviceKind, DeviceReading>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        let readings = DeviceKind::ALL
            .into_iter()
            .map(|kind| (kind, DeviceReading::unknown(kind)))
            .collect();
        Self {
            readings: Mutex::new(readings),
        }
    }

    /// Current raw value.
    pub fn get(&self, device: DeviceKind) -> i64 {
        self.reading(device).value
    }

    pub fn reading(&self, device: DeviceKind) -> DeviceReading {
        self.readings
            .lock()
            .get(&device)
            .copied()
            .unwrap_or_else(|| DeviceReading::unknown(device))
    }

    pub fn state(&self, device: DeviceKind) -> SemanticState {
        self.reading(device).state()
    }

    /// Record an inbound telemetry value.
    pub fn set(&self, device: DeviceKind, value: i64) {
        self.readings.lock().insert(
            device,
            DeviceReading {
                device,
                value,
                updated_at: Some(Utc::now()),
            },
        );
    }

    /// Invalidate a reading, returning the value it held.
    pub fn reset(&self, device: DeviceKind) -> i64 {
        let mut readings = self.readings.lock();
        let entry = readings
            .entry(device)
            .or_insert_with(|| DeviceReading::unknown(device));
        std::mem::replace(&mut entry.value, READING_UNKNOWN)
    }

    pub fn snapshot(&self) -> Vec<DeviceReading> {
        self.readings.lock().values().copied().collect()
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}
