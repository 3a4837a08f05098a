use crate::deserialize_id;
use serde::{Deserialize, Serialize};

/// One batch pushed by a reader: every tag it heard during the last scan window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestPayload {
    #[serde(deserialize_with = "deserialize_id")]
    pub reader_id: String,
    /// Reader-side clock, kept for logs only.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub observations: Vec<ObservationReport>,
}

impl IngestPayload {
    /// Drops entries with a blank `tag_id` and returns how many were dropped.
    pub fn retain_addressable(&mut self) -> usize {
        let before = self.observations.len();
        self.observations
            .retain(|observation| !observation.tag_id.trim().is_empty());
        before - self.observations.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservationReport {
    #[serde(deserialize_with = "deserialize_id")]
    pub tag_id: String,
    pub rssi: i32,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestAck {
    pub ok: bool,
    pub processed: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhereResponse {
    pub resolved: bool,
    pub tag_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

impl WhereResponse {
    pub fn unknown(tag_id: impl Into<String>) -> Self {
        Self {
            resolved: false,
            tag_id: tag_id.into(),
            reader_id: None,
            location_name: None,
            rssi: None,
        }
    }

    pub fn resolved(
        tag_id: impl Into<String>,
        reader_id: impl Into<String>,
        location_name: impl Into<String>,
        rssi: Option<i32>,
    ) -> Self {
        Self {
            resolved: true,
            tag_id: tag_id.into(),
            reader_id: Some(reader_id.into()),
            location_name: Some(location_name.into()),
            rssi,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservationView {
    pub reader_id: String,
    pub rssi: i32,
    pub count: i64,
    pub last_seen: i64,
    pub receipt_ts: String,
    pub live: bool,
}

/// Raw per-tag view for diagnostics; not part of the location answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagStateView {
    pub tag_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_reader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_rssi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_reader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub observations: Vec<ObservationView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_accepts_numeric_identifiers_and_missing_device_fields() {
        let payload: IngestPayload = serde_json::from_value(json!({
            "reader_id": "M501",
            "ts": 1_700_000_000,
            "observations": [
                {"tag_id": 4411, "rssi": -61},
                {"tag_id": "T2", "rssi": -70, "count": 3, "last_seen": 1_699_999_999}
            ]
        }))
        .expect("parse payload");

        assert_eq!(payload.observations.len(), 2);
        assert_eq!(payload.observations[0].tag_id, "4411");
        assert_eq!(payload.observations[0].count, 0);
        assert_eq!(payload.observations[1].last_seen, 1_699_999_999);
    }

    #[test]
    fn payload_rejects_missing_rssi() {
        let parsed = serde_json::from_value::<IngestPayload>(json!({
            "reader_id": "M501",
            "observations": [{"tag_id": "T1"}]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_where_response_omits_location_fields() {
        let body = serde_json::to_value(WhereResponse::unknown("T9")).expect("serialize");
        assert_eq!(body, json!({"resolved": false, "tag_id": "T9"}));
    }

    #[test]
    fn blank_tag_entries_are_dropped_and_counted() {
        let mut payload: IngestPayload = serde_json::from_value(json!({
            "reader_id": "M501",
            "observations": [
                {"tag_id": "T1", "rssi": -50},
                {"tag_id": "", "rssi": -60},
                {"tag_id": "  ", "rssi": -70}
            ]
        }))
        .expect("parse payload");

        assert_eq!(payload.retain_addressable(), 2);
        assert_eq!(payload.observations.len(), 1);
        assert_eq!(payload.observations[0].tag_id, "T1");

        let ack = IngestAck {
            ok: true,
            processed: 1,
            skipped: 2,
        };
        assert_eq!(
            serde_json::to_value(ack).expect("serialize"),
            json!({"ok": true, "processed": 1, "skipped": 2})
        );
    }
}
