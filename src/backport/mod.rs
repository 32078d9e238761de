// Backport orchestration
// Commit selection, per-branch cherry-picking, conflict handling and
// pull request publication

pub mod completeness;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod naming;
pub mod payload;
pub mod resolution;
pub mod sequencer;

pub use completeness::{CommitWithoutBackport, CompletenessAnalyzer};
pub use engine::{CherrypickEngine, Collaborators, PickOutcome};
pub use errors::BackportError;
pub use naming::backport_branch_name;
pub use resolution::{ConflictSnapshot, ResolutionLoop};
pub use sequencer::{BackportResponse, BranchOutcome, Sequencer};
