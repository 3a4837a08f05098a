use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tag_id: String,
    pub reader_id: String,
    pub rssi: i32,
    /// Device-reported hit count; stored, never used for decisions.
    pub count: i64,
    /// Device-reported last-seen time; stored, never used for decisions.
    pub device_ts: i64,
    pub receipt_ts: DateTime<Utc>,
}

impl Observation {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.receipt_ts
    }

    pub fn is_live(&self, now: DateTime<Utc>, stale_window: Duration) -> bool {
        self.age(now) <= stale_window
    }
}

/// Latest sighting of one tag per reader. A new sighting replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObservations {
    tag_id: String,
    by_reader: BTreeMap<String, Observation>,
}

impl TagObservations {
    pub fn new(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            by_reader: BTreeMap::new(),
        }
    }

    pub fn tag_id(&self) -> &str {
        &self.tag_id
    }

    pub fn record(
        &mut self,
        reader_id: &str,
        rssi: i32,
        count: i64,
        device_ts: i64,
        now: DateTime<Utc>,
    ) {
        self.by_reader.insert(
            reader_id.to_string(),
            Observation {
                tag_id: self.tag_id.clone(),
                reader_id: reader_id.to_string(),
                rssi,
                count,
                device_ts,
                receipt_ts: now,
            },
        );
    }

    pub fn get(&self, reader_id: &str) -> Option<&Observation> {
        self.by_reader.get(reader_id)
    }

    /// Ascending by reader id.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.by_reader.values()
    }

    pub fn len(&self) -> usize {
        self.by_reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reader.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, Observation> {
        self.by_reader.clone()
    }
}
