//! Tutoring Sessions
//!
//! A session teaches one knowledge-graph node. [`SessionEngine::step`] drives
//! an explicit phase machine: each call consumes at most one learner input,
//! runs automatic phases, and returns either suspended at a waiting phase or
//! finished. State is a plain serializable value the host persists between
//! steps.

pub mod collaborators;
pub mod engine;
mod machine;
pub mod objective;
pub mod phase;
pub mod policy;
pub mod state;

pub use collaborators::{
    MasteryUpdater, MemoryKnowledge, MemoryTranscript, NodeSnapshot, ObjectiveStore,
    TranscriptEntry, TranscriptSink,
};
pub use engine::{Collaborators, EngineModels, SessionEngine};
pub use machine::wrap_up_summary;
pub use objective::{partition_objectives, Objective, ObjectivePartition, MASTERY_THRESHOLD};
pub use phase::{Phase, PrereqChoice};
pub use policy::SessionPolicy;
pub use state::{
    Assessment, Message, MessageTag, SessionState, Speaker, StepOutcome, UserInput,
};
