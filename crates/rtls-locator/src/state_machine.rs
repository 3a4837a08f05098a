use crate::observations::TagObservations;
use crate::selector::Candidate;
use chrono::{DateTime, Duration, Utc};
use rtls_core::ResolverConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedReader {
    pub reader_id: String,
    pub rssi: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCandidate {
    pub reader_id: String,
    pub since: DateTime<Utc>,
}

/// Committed decision for one tag plus the challenger currently dwelling, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagLocationState {
    pub current: Option<CommittedReader>,
    pub candidate: Option<PendingCandidate>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TagLocationState {
    pub fn current_reader(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.reader_id.as_str())
    }

    pub fn current_rssi(&self) -> Option<i32> {
        self.current.as_ref().map(|c| c.rssi)
    }

    pub fn candidate_reader(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.reader_id.as_str())
    }

    pub fn candidate_since(&self) -> Option<DateTime<Utc>> {
        self.candidate.as_ref().map(|c| c.since)
    }

    fn commit(&mut self, best: &Candidate, now: DateTime<Utc>) {
        self.current = Some(CommittedReader {
            reader_id: best.reader_id.clone(),
            rssi: best.rssi,
        });
        self.candidate = None;
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First decision for the tag, taken without dwell.
    Bootstrapped { reader_id: String },
    Reaffirmed { reader_id: String },
    /// Challenger did not beat the incumbent by the hysteresis margin.
    HeldByHysteresis {
        incumbent: String,
        challenger: String,
        margin_db: i32,
    },
    CandidateStarted {
        reader_id: String,
        replaced: Option<String>,
    },
    CandidatePending {
        reader_id: String,
        remaining: Duration,
    },
    Switched { from: String, to: String },
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Bootstrapped { .. } => "bootstrapped",
            Transition::Reaffirmed { .. } => "reaffirmed",
            Transition::HeldByHysteresis { .. } => "held_by_hysteresis",
            Transition::CandidateStarted { .. } => "candidate_started",
            Transition::CandidatePending { .. } => "candidate_pending",
            Transition::Switched { .. } => "switched",
        }
    }

    pub fn changed_reader(&self) -> bool {
        matches!(
            self,
            Transition::Bootstrapped { .. } | Transition::Switched { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocationStateMachine {
    config: ResolverConfig,
}

impl LocationStateMachine {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Live signal of `reader_id` for this tag. `None` means no signal: the
    /// reader was never seen or its sighting aged out, so any live challenger
    /// clears the hysteresis gate against it.
    pub fn reference_signal(
        &self,
        observations: &TagObservations,
        reader_id: &str,
        now: DateTime<Utc>,
    ) -> Option<i32> {
        observations
            .get(reader_id)
            .filter(|observation| observation.is_live(now, self.config.stale_window))
            .map(|observation| observation.rssi)
    }

    pub fn advance(
        &self,
        state: &mut TagLocationState,
        observations: &TagObservations,
        best: &Candidate,
        now: DateTime<Utc>,
    ) -> Transition {
        let incumbent = match state.current.as_ref() {
            None => {
                state.commit(best, now);
                return Transition::Bootstrapped {
                    reader_id: best.reader_id.clone(),
                };
            }
            Some(current) => current.reader_id.clone(),
        };

        if best.reader_id == incumbent {
            state.commit(best, now);
            return Transition::Reaffirmed {
                reader_id: incumbent,
            };
        }

        if let Some(reference) = self.reference_signal(observations, &incumbent, now) {
            let margin_db = best.rssi.saturating_sub(reference);
            if margin_db < self.config.hysteresis_db {
                state.current = Some(CommittedReader {
                    reader_id: incumbent.clone(),
                    rssi: reference,
                });
                state.candidate = None;
                state.updated_at = Some(now);
                return Transition::HeldByHysteresis {
                    incumbent,
                    challenger: best.reader_id.clone(),
                    margin_db,
                };
            }
        }

        let dwelling_since = state
            .candidate
            .as_ref()
            .filter(|pending| pending.reader_id == best.reader_id)
            .map(|pending| pending.since);

        match dwelling_since {
            None => {
                let replaced = state
                    .candidate
                    .replace(PendingCandidate {
                        reader_id: best.reader_id.clone(),
                        since: now,
                    })
                    .map(|previous| previous.reader_id);
                Transition::CandidateStarted {
                    reader_id: best.reader_id.clone(),
                    replaced,
                }
            }
            Some(since) if now - since >= self.config.dwell => {
                state.commit(best, now);
                Transition::Switched {
                    from: incumbent,
                    to: best.reader_id.clone(),
                }
            }
            Some(since) => Transition::CandidatePending {
                reader_id: best.reader_id.clone(),
                remaining: self.config.dwell - (now - since),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_771_855_200 + sec, 0)
            .single()
            .expect("valid timestamp")
    }

    fn machine() -> LocationStateMachine {
        LocationStateMachine::new(ResolverConfig::default())
    }

    fn candidate(reader_id: &str, rssi: i32, at: i64) -> Candidate {
        Candidate {
            reader_id: reader_id.to_string(),
            rssi,
            receipt_ts: ts(at),
        }
    }

    fn locked_on(reader_id: &str, rssi: i32, at: i64) -> TagLocationState {
        TagLocationState {
            current: Some(CommittedReader {
                reader_id: reader_id.to_string(),
                rssi,
            }),
            candidate: None,
            updated_at: Some(ts(at)),
        }
    }

    #[test]
    fn first_candidate_locks_immediately() {
        let mut obs = TagObservations::new("T1");
        obs.record("R1", -72, 1, 0, ts(0));
        let mut state = TagLocationState::default();

        let transition = machine().advance(&mut state, &obs, &candidate("R1", -72, 0), ts(0));

        assert_eq!(
            transition,
            Transition::Bootstrapped {
                reader_id: "R1".to_string()
            }
        );
        assert_eq!(state.current_reader(), Some("R1"));
        assert_eq!(state.current_rssi(), Some(-72));
        assert_eq!(state.candidate, None);
        assert_eq!(state.updated_at, Some(ts(0)));
    }

    #[test]
    fn reaffirmation_updates_rssi_and_drops_pending_candidate() {
        let mut obs = TagObservations::new("T1");
        obs.record("R1", -58, 1, 0, ts(4));
        let mut state = locked_on("R1", -70, 0);
        state.candidate = Some(PendingCandidate {
            reader_id: "R2".to_string(),
            since: ts(3),
        });

        let transition = machine().advance(&mut state, &obs, &candidate("R1", -58, 4), ts(4));

        assert_eq!(
            transition,
            Transition::Reaffirmed {
                reader_id: "R1".to_string()
            }
        );
        assert_eq!(state.current_rssi(), Some(-58));
        assert_eq!(state.candidate, None);
        assert_eq!(state.updated_at, Some(ts(4)));
    }

    #[test]
    fn weak_challenger_is_held_and_incumbent_signal_resampled() {
        let mut obs = TagObservations::new("T1");
        obs.record("A", -60, 1, 0, ts(1));
        obs.record("B", -55, 1, 0, ts(2));
        let mut state = locked_on("A", -63, 0);
        state.candidate = Some(PendingCandidate {
            reader_id: "B".to_string(),
            since: ts(1),
        });

        let transition = machine().advance(&mut state, &obs, &candidate("B", -55, 2), ts(2));

        assert_eq!(
            transition,
            Transition::HeldByHysteresis {
                incumbent: "A".to_string(),
                challenger: "B".to_string(),
                margin_db: 5,
            }
        );
        assert_eq!(state.current_reader(), Some("A"));
        assert_eq!(state.current_rssi(), Some(-60));
        assert_eq!(state.candidate, None);
        assert_eq!(state.updated_at, Some(ts(2)));
    }

    #[test]
    fn strong_challenger_dwells_before_switching() {
        let mut obs = TagObservations::new("T1");
        obs.record("A", -60, 1, 0, ts(0));
        let mut state = locked_on("A", -60, 0);
        let sm = machine();

        obs.record("B", -50, 1, 0, ts(1));
        let started = sm.advance(&mut state, &obs, &candidate("B", -50, 1), ts(1));
        assert_eq!(
            started,
            Transition::CandidateStarted {
                reader_id: "B".to_string(),
                replaced: None,
            }
        );
        assert_eq!(state.candidate_reader(), Some("B"));
        assert_eq!(state.candidate_since(), Some(ts(1)));
        assert_eq!(state.updated_at, Some(ts(0)));

        obs.record("A", -60, 1, 0, ts(2));
        obs.record("B", -50, 1, 0, ts(2));
        let pending = sm.advance(&mut state, &obs, &candidate("B", -50, 2), ts(2));
        assert_eq!(
            pending,
            Transition::CandidatePending {
                reader_id: "B".to_string(),
                remaining: Duration::seconds(1),
            }
        );
        assert_eq!(state.current_reader(), Some("A"));

        obs.record("B", -50, 1, 0, ts(3));
        let switched = sm.advance(&mut state, &obs, &candidate("B", -50, 3), ts(3));
        assert_eq!(
            switched,
            Transition::Switched {
                from: "A".to_string(),
                to: "B".to_string(),
            }
        );
        assert_eq!(state.current_reader(), Some("B"));
        assert_eq!(state.current_rssi(), Some(-50));
        assert_eq!(state.candidate, None);
        assert_eq!(state.updated_at, Some(ts(3)));
    }

    #[test]
    fn different_challenger_restarts_the_dwell_window() {
        let mut obs = TagObservations::new("T1");
        obs.record("A", -70, 1, 0, ts(0));
        obs.record("C", -45, 1, 0, ts(2));
        let mut state = locked_on("A", -70, 0);
        state.candidate = Some(PendingCandidate {
            reader_id: "B".to_string(),
            since: ts(0),
        });

        let transition = machine().advance(&mut state, &obs, &candidate("C", -45, 2), ts(2));

        assert_eq!(
            transition,
            Transition::CandidateStarted {
                reader_id: "C".to_string(),
                replaced: Some("B".to_string()),
            }
        );
        assert_eq!(state.candidate_reader(), Some("C"));
        assert_eq!(state.candidate_since(), Some(ts(2)));
        assert_eq!(state.current_reader(), Some("A"));
    }

    #[test]
    fn silent_incumbent_never_blocks_a_live_challenger() {
        let sm = machine();
        let mut obs = TagObservations::new("T1");
        obs.record("A", -40, 1, 0, ts(0));
        obs.record("B", -90, 1, 0, ts(10));
        assert_eq!(sm.reference_signal(&obs, "A", ts(10)), None);
        assert_eq!(sm.reference_signal(&obs, "Z", ts(10)), None);
        assert_eq!(sm.reference_signal(&obs, "B", ts(10)), Some(-90));

        let mut state = locked_on("A", -40, 0);
        let transition = sm.advance(&mut state, &obs, &candidate("B", -90, 10), ts(10));

        assert!(matches!(transition, Transition::CandidateStarted { .. }));
        assert_eq!(state.current_rssi(), Some(-40));
    }

    #[test]
    fn transition_labels_flag_reader_changes() {
        let switched = Transition::Switched {
            from: "A".to_string(),
            to: "B".to_string(),
        };
        assert_eq!(switched.as_str(), "switched");
        assert!(switched.changed_reader());
        assert!(!Transition::Reaffirmed {
            reader_id: "A".to_string()
        }
        .changed_reader());
    }
}
