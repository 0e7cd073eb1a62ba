//! Vector storage and exact k-nearest-neighbour search

pub mod distance;
mod snapshot;
mod vector_index;

pub use snapshot::{IndexSnapshot, SnapshotEntry, INDEX_SCHEMA_VERSION};
pub use vector_index::VectorIndex;
