use dashmap::DashMap;

use crate::model::{Identifier, OriginDescriptor, ResolutionResult};

use super::{ProvenanceStorage, StorageError};

/// Keeps results for the lifetime of the process. Records of different identifiers live
/// in different map shards and never contend.
#[derive(Default)]
pub struct InMemoryProvenanceStorage {
    records: DashMap<Identifier, Vec<(OriginDescriptor, ResolutionResult)>>,
}

impl InMemoryProvenanceStorage {
    pub fn new() -> Self {
        InMemoryProvenanceStorage::default()
    }

    /// Every record, sorted by identifier.
    pub(super) fn snapshot(&self) -> Vec<(Identifier, OriginDescriptor, ResolutionResult)> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .flat_map(|entry| {
                let id = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|(origin, result)| (id.clone(), origin.clone(), result.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Number of records over all identifiers.
    pub(super) fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub(super) fn insert(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
        result: &ResolutionResult,
    ) {
        let mut entries = self.records.entry(id.clone()).or_default();
        match entries.iter_mut().find(|(existing, _)| existing == origin) {
            Some((_, existing)) => *existing = result.clone(),
            None => entries.push((origin.clone(), result.clone())),
        }
    }
}

impl ProvenanceStorage for InMemoryProvenanceStorage {
    fn read(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
    ) -> Result<Option<ResolutionResult>, StorageError> {
        Ok(self.records.get(id).and_then(|entries| {
            entries
                .iter()
                .find(|(existing, _)| existing == origin)
                .map(|(_, result)| result.clone())
        }))
    }

    fn write(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
        result: &ResolutionResult,
    ) -> Result<(), StorageError> {
        self.insert(id, origin, result);
        Ok(())
    }

    fn read_all(&self, id: &Identifier) -> Result<Vec<ResolutionResult>, StorageError> {
        Ok(self
            .records
            .get(id)
            .map(|entries| entries.iter().map(|(_, result)| result.clone()).collect())
            .unwrap_or_default())
    }

    fn remove(&self, id: &Identifier) -> Result<usize, StorageError> {
        Ok(self
            .records
            .remove(id)
            .map_or(0, |(_, entries)| entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{ArtifactProvenance, Hash, RemoteArtifact, VcsInfo, VcsType};

    use super::*;

    use pretty_assertions::assert_eq;

    fn artifact() -> OriginDescriptor {
        OriginDescriptor::Artifact(RemoteArtifact::new(
            "https://example.com/a.tgz",
            Hash::none(),
        ))
    }

    fn vcs() -> OriginDescriptor {
        OriginDescriptor::Vcs(VcsInfo::new(
            VcsType::Git,
            "https://example.com/a",
            "v1.0.0",
        ))
    }

    fn resolved() -> ResolutionResult {
        ResolutionResult::Artifact(ArtifactProvenance {
            source_artifact: RemoteArtifact::new("https://example.com/a.tgz", Hash::none()),
        })
    }

    #[test]
    fn read_what_was_written() {
        let storage = InMemoryProvenanceStorage::new();
        let id = Identifier::new("NPM", "", "a", "1.0.0");

        assert_eq!(storage.read(&id, &artifact()).unwrap(), None);
        storage.write(&id, &artifact(), &resolved()).unwrap();
        assert_eq!(storage.read(&id, &artifact()).unwrap(), Some(resolved()));
        assert_eq!(storage.read(&id, &vcs()).unwrap(), None);
    }

    #[test]
    fn last_writer_wins() {
        let storage = InMemoryProvenanceStorage::new();
        let id = Identifier::new("NPM", "", "a", "1.0.0");
        let failure = ResolutionResult::Unresolved {
            message: "not found".to_owned(),
        };

        storage.write(&id, &vcs(), &failure).unwrap();
        storage.write(&id, &artifact(), &resolved()).unwrap();
        storage.write(&id, &artifact(), &failure).unwrap();

        assert_eq!(
            storage.read_all(&id).unwrap(),
            vec![failure.clone(), failure]
        );
    }

    #[test]
    fn identifiers_are_isolated() {
        let storage = InMemoryProvenanceStorage::new();
        let id = Identifier::new("NPM", "", "a", "1.0.0");
        let other = Identifier::new("NPM", "", "a", "2.0.0");

        storage.write(&id, &artifact(), &resolved()).unwrap();
        storage.write(&id, &vcs(), &resolved()).unwrap();

        assert!(storage.read_all(&other).unwrap().is_empty());
        assert_eq!(storage.remove(&id).unwrap(), 2);
        assert_eq!(storage.remove(&id).unwrap(), 0);
        assert!(storage.read_all(&id).unwrap().is_empty());
    }
}
