//! Cognitive annotation of conversational turns.
//!
//! - [`aggregator`]: sequences the advisory subsystems and builds the prompt
//! - [`prompt`]: fixed-order prompt assembly
//! - [`notes`]: per-turn advisory notes and the COGNITIVE STATE block
//! - [`trace`]: metacognitive traces and quality reflection
//! - [`language`]: reply-language detection
//! - [`topic`]: topic classification and cause/effect extraction

pub mod aggregator;
pub mod language;
pub mod notes;
pub mod prompt;
pub mod topic;
pub mod trace;

pub use aggregator::{Aggregator, Annotation, PreparedTurn, select_backend};
pub use notes::{AdvisoryNotes, StageFailure};
pub use trace::{QualityReflection, TraceLog};
