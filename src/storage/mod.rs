//! Durable cache of provenance resolution results.
//!
//! Results are keyed by package identifier and [`OriginDescriptor`], and failures are
//! stored as well, so that repeated runs neither re-hit the network for known
//! provenances nor retry known-bad origins. Concurrent writes to the same key are
//! last-writer-wins.

mod file;
mod memory;

use thiserror::Error;

use crate::model::{Identifier, OriginDescriptor, ResolutionResult};

pub use self::{file::FileProvenanceStorage, memory::InMemoryProvenanceStorage};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Error while parsing stored provenances: {0}")]
    Parsing(#[from] crate::model::ParseError),
    #[error("Error while serializing stored provenances: {0}")]
    Serialization(#[from] toml::ser::Error),
}

pub trait ProvenanceStorage: Send + Sync {
    fn read(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
    ) -> Result<Option<ResolutionResult>, StorageError>;

    fn write(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
        result: &ResolutionResult,
    ) -> Result<(), StorageError>;

    /// All results stored for `id`, in the order their origins were first written.
    fn read_all(&self, id: &Identifier) -> Result<Vec<ResolutionResult>, StorageError>;

    /// Forgets every result stored for `id` and returns how many there were.
    fn remove(&self, id: &Identifier) -> Result<usize, StorageError>;
}
