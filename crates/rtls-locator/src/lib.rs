pub mod directory;
pub mod engine;
pub mod observations;
pub mod selector;
pub mod state_machine;

pub use directory::{LayeredDirectory, LocationDirectory, StaticDirectory};
pub use engine::{IngestReport, LocationEngine, LocationResult, TagSnapshot};
pub use observations::{Observation, TagObservations};
pub use selector::{Candidate, CandidateSelector};
pub use state_machine::{
    CommittedReader, LocationStateMachine, PendingCandidate, TagLocationState, Transition,
};
