//! Persistence: artifact store and read-only resource addressing.

pub mod artifacts;
pub mod resources;

pub use artifacts::{ArtifactStore, ProjectMetadata, ResultCounts};
pub use resources::{ResourceContent, ResourceEntry, ResourceExposer, SCHEME};
