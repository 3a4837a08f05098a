use crate::directory::{LocationDirectory, StaticDirectory};
use crate::observations::{Observation, TagObservations};
use crate::selector::{Candidate, CandidateSelector};
use crate::state_machine::{LocationStateMachine, TagLocationState, Transition};
use chrono::{DateTime, Utc};
use rtls_core::ingest_contracts::{IngestPayload, ObservationView, TagStateView, WhereResponse};
use rtls_core::ResolverConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationResult {
    Unknown,
    Resolved {
        reader_id: String,
        location_name: String,
        rssi: i32,
    },
}

impl LocationResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, LocationResult::Resolved { .. })
    }

    pub fn to_response(&self, tag_id: &str) -> WhereResponse {
        match self {
            LocationResult::Unknown => WhereResponse::unknown(tag_id),
            LocationResult::Resolved {
                reader_id,
                location_name,
                rssi,
            } => WhereResponse::resolved(
                tag_id,
                reader_id.as_str(),
                location_name.as_str(),
                Some(*rssi),
            ),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    pub decided: usize,
    pub unresolved: usize,
    pub switches: usize,
}

/// Observations and state of one tag, read under a single lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSnapshot {
    pub observations: BTreeMap<String, Observation>,
    pub state: Option<TagLocationState>,
}

struct TagSlot {
    observations: TagObservations,
    state: Option<TagLocationState>,
}

impl TagSlot {
    fn new(tag_id: &str) -> Self {
        Self {
            observations: TagObservations::new(tag_id),
            state: None,
        }
    }
}

pub struct LocationEngine {
    selector: CandidateSelector,
    machine: LocationStateMachine,
    directory: Arc<dyn LocationDirectory>,
    slots: RwLock<HashMap<String, Arc<Mutex<TagSlot>>>>,
}

impl LocationEngine {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_directory(config, Arc::new(StaticDirectory::new()))
    }

    pub fn with_directory(config: ResolverConfig, directory: Arc<dyn LocationDirectory>) -> Self {
        Self {
            selector: CandidateSelector::new(config.stale_window),
            machine: LocationStateMachine::new(config),
            directory,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        self.machine.config()
    }

    /// Applies one reader batch. Every observation is recorded and fully
    /// decided before the next one; `now` is the receipt time of the whole batch.
    pub fn ingest(&self, payload: &IngestPayload, now: DateTime<Utc>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut last: Option<(String, Option<Candidate>)> = None;

        for report_entry in &payload.observations {
            report.processed += 1;
            let slot = self.slot_or_insert(&report_entry.tag_id);
            let mut slot = lock(&slot);
            slot.observations.record(
                &payload.reader_id,
                report_entry.rssi,
                report_entry.count,
                report_entry.last_seen,
                now,
            );

            let best = self.selector.pick_best(&slot.observations, now);
            let Some(candidate) = best.as_ref() else {
                report.unresolved += 1;
                last = Some((report_entry.tag_id.clone(), None));
                continue;
            };

            let slot = &mut *slot;
            let state = slot.state.get_or_insert_with(TagLocationState::default);
            let transition = self
                .machine
                .advance(state, &slot.observations, candidate, now);
            report.decided += 1;
            if matches!(transition, Transition::Switched { .. }) {
                report.switches += 1;
            }
            log_transition(&report_entry.tag_id, &transition);
            last = Some((report_entry.tag_id.clone(), best));
        }

        if let Some((tag_id, best)) = last {
            let readers: Vec<(String, i32)> = self
                .observations(&tag_id)
                .into_values()
                .map(|observation| (observation.reader_id, observation.rssi))
                .collect();
            debug!(
                event = "ingest_snapshot",
                tag_id = %tag_id,
                readers = ?readers,
                best = ?best.map(|candidate| (candidate.reader_id, candidate.rssi))
            );
        }

        info!(
            event = "ingest_batch",
            reader_id = %payload.reader_id,
            device_ts = payload.ts,
            processed = report.processed,
            decided = report.decided,
            unresolved = report.unresolved,
            switches = report.switches
        );
        report
    }

    /// Stores a sighting without re-evaluating the tag's location.
    pub fn record(
        &self,
        tag_id: &str,
        reader_id: &str,
        rssi: i32,
        count: i64,
        device_ts: i64,
        now: DateTime<Utc>,
    ) {
        let slot = self.slot_or_insert(tag_id);
        lock(&slot)
            .observations
            .record(reader_id, rssi, count, device_ts, now);
    }

    pub fn observations(&self, tag_id: &str) -> BTreeMap<String, Observation> {
        let Some(slot) = self.slot(tag_id) else {
            return BTreeMap::new();
        };
        let observations = lock(&slot).observations.to_map();
        observations
    }

    pub fn pick_best(&self, tag_id: &str, now: DateTime<Utc>) -> Option<Candidate> {
        let slot = self.slot(tag_id)?;
        let guard = lock(&slot);
        self.selector.pick_best(&guard.observations, now)
    }

    pub fn state(&self, tag_id: &str) -> Option<TagLocationState> {
        let slot = self.slot(tag_id)?;
        let state = lock(&slot).state.clone();
        state
    }

    pub fn snapshot(&self, tag_id: &str) -> Option<TagSnapshot> {
        let slot = self.slot(tag_id)?;
        let guard = lock(&slot);
        Some(TagSnapshot {
            observations: guard.observations.to_map(),
            state: guard.state.clone(),
        })
    }

    /// Last committed decision for the tag. Never mutates state.
    pub fn locate(&self, tag_id: &str) -> LocationResult {
        let Some(current) = self.state(tag_id).and_then(|state| state.current) else {
            return LocationResult::Unknown;
        };
        let location_name = self
            .directory
            .location_name(&current.reader_id)
            .unwrap_or_else(|| current.reader_id.clone());
        LocationResult::Resolved {
            reader_id: current.reader_id,
            location_name,
            rssi: current.rssi,
        }
    }

    pub fn view(&self, tag_id: &str, now: DateTime<Utc>) -> Option<TagStateView> {
        let snapshot = self.snapshot(tag_id)?;
        let stale_window = self.config().stale_window;
        let state = snapshot.state.unwrap_or_default();
        Some(TagStateView {
            tag_id: tag_id.to_string(),
            current_reader: state.current_reader().map(str::to_string),
            current_rssi: state.current_rssi(),
            candidate_reader: state.candidate_reader().map(str::to_string),
            candidate_since: state.candidate_since().map(|ts| ts.to_rfc3339()),
            updated_at: state.updated_at.map(|ts| ts.to_rfc3339()),
            observations: snapshot
                .observations
                .into_values()
                .map(|observation| ObservationView {
                    live: observation.is_live(now, stale_window),
                    reader_id: observation.reader_id,
                    rssi: observation.rssi,
                    count: observation.count,
                    last_seen: observation.device_ts,
                    receipt_ts: observation.receipt_ts.to_rfc3339(),
                })
                .collect(),
        })
    }

    pub fn tag_count(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, tag_id: &str) -> Option<Arc<Mutex<TagSlot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag_id)
            .cloned()
    }

    fn slot_or_insert(&self, tag_id: &str) -> Arc<Mutex<TagSlot>> {
        if let Some(slot) = self.slot(tag_id) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(tag_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TagSlot::new(tag_id))))
            .clone()
    }
}

// Every mutation leaves a slot consistent, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_transition(tag_id: &str, transition: &Transition) {
    match transition {
        Transition::Bootstrapped { reader_id } => {
            info!(event = "location_locked", tag_id = tag_id, reader_id = %reader_id);
        }
        Transition::Switched { from, to } => {
            info!(event = "location_switched", tag_id = tag_id, from = %from, to = %to);
        }
        Transition::HeldByHysteresis {
            incumbent,
            challenger,
            margin_db,
        } => {
            debug!(
                event = "location_held",
                tag_id = tag_id,
                incumbent = %incumbent,
                challenger = %challenger,
                margin_db = margin_db
            );
        }
        Transition::CandidatePending {
            reader_id,
            remaining,
        } => {
            debug!(
                event = "candidate_pending",
                tag_id = tag_id,
                reader_id = %reader_id,
                remaining_ms = remaining.num_milliseconds()
            );
        }
        other => {
            debug!(event = other.as_str(), tag_id = tag_id, transition = ?other);
        }
    }
}
