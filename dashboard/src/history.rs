use crate::model::LogEntry;
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;

/// Fixed-capacity log that drops its oldest entry when full
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Entries kept by the live device log
pub const DEVICE_LOG_CAPACITY: usize = 200;

const LOG_SOURCE: &str = "MQTT Broker";

/// Raw inbound traffic, captured only while logging is switched on
#[derive(Debug, Clone)]
pub struct DeviceLog {
    logging: bool,
    entries: BoundedLog<LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceLogView {
    pub logging: bool,
    pub entries: Vec<LogEntry>,
}

impl Default for DeviceLog {
    fn default() -> Self {
        Self {
            logging: false,
            entries: BoundedLog::new(DEVICE_LOG_CAPACITY),
        }
    }
}

impl DeviceLog {
    pub fn start(&mut self) {
        self.logging = true;
    }

    pub fn stop(&mut self) {
        self.logging = false;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ignored while logging is stopped
    pub fn record(&mut self, topic: &str, payload: &[u8]) {
        if !self.logging {
            return;
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            source: LOG_SOURCE.to_string(),
        });
    }

    pub fn view(&self) -> DeviceLogView {
        DeviceLogView {
            logging: self.logging,
            entries: self.entries.to_vec(),
        }
    }
}
