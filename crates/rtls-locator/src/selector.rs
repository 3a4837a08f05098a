use crate::observations::{Observation, TagObservations};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub reader_id: String,
    pub rssi: i32,
    pub receipt_ts: DateTime<Utc>,
}

impl From<&Observation> for Candidate {
    fn from(observation: &Observation) -> Self {
        Self {
            reader_id: observation.reader_id.clone(),
            rssi: observation.rssi,
            receipt_ts: observation.receipt_ts,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    stale_window: Duration,
}

impl CandidateSelector {
    pub fn new(stale_window: Duration) -> Self {
        Self { stale_window }
    }

    /// Strongest live reader for the tag, or `None` when every sighting is stale.
    /// Equal rssi goes to the smallest reader id.
    pub fn pick_best(
        &self,
        observations: &TagObservations,
        now: DateTime<Utc>,
    ) -> Option<Candidate> {
        let mut best: Option<&Observation> = None;
        for observation in observations.iter() {
            if !observation.is_live(now, self.stale_window) {
                continue;
            }
            match best {
                Some(current) if current.rssi >= observation.rssi => {}
                _ => best = Some(observation),
            }
        }
        best.map(Candidate::from)
    }
}
