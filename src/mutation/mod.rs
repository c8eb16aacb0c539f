//! Write lifecycle: hook sequencing and optimistic concurrency.

pub mod conflict;
pub mod orchestrator;
pub mod stage;

pub use conflict::ConflictDetector;
pub use orchestrator::MutationOrchestrator;
pub use stage::{MutationKind, MutationStage, StageTracker};
