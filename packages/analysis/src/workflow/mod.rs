//! Queue-managed sequential workflow with checkpointing and progress.

pub mod checkpoint;
pub mod engine;
pub mod progress;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use engine::{PageProcessor, WorkflowEngine, WorkflowHandle, WorkflowOptions, WorkflowSummary};
pub use progress::{PageState, ProgressCounts, ProgressEmitter, ProgressEvent, WorkflowState};
