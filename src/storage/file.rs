use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::model::{Identifier, OriginDescriptor, ParseError, ResolutionResult};

use super::{memory::InMemoryProvenanceStorage, ProvenanceStorage, StorageError};

const VERSION: i64 = 1;
const RECORD_HEADER: &str = "\n[[records]]";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct StoredProvenances {
    /// Never written as `records = []`, which later `[[records]]` could not extend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct VersionedStoredProvenances<'a> {
    version: i64,
    #[serde(flatten)]
    content: &'a StoredProvenances,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredRecord {
    id: Identifier,
    origin: OriginDescriptor,
    result: ResolutionResult,
}

/// A single `[[records]]` entry, appended to an existing file.
#[derive(Serialize)]
struct AppendedRecord<'a> {
    records: [StoredRecordRef<'a>; 1],
}

#[derive(Serialize)]
struct StoredRecordRef<'a> {
    id: &'a Identifier,
    origin: &'a OriginDescriptor,
    result: &'a ResolutionResult,
}

impl StoredProvenances {
    #[allow(clippy::should_implement_trait)]
    fn from_str(s: &str) -> Result<StoredProvenances, ParseError> {
        let mut table = toml::from_str::<toml::Table>(s)?;
        match table.remove("version") {
            Some(toml::Value::Integer(VERSION)) => {
                table.try_into::<StoredProvenances>().map_err(Into::into)
            }
            Some(other) => Err(ParseError::UnsupportedVersion(other)),
            None => Err(ParseError::MissingVersion),
        }
    }

    /// Parses `s`, dropping a trailing record that a crash left incomplete. The flag
    /// tells whether anything was dropped.
    fn recover_from_str(s: &str) -> Result<(StoredProvenances, bool), ParseError> {
        match StoredProvenances::from_str(s) {
            Ok(stored) => Ok((stored, false)),
            Err(error) => match s.rfind(RECORD_HEADER) {
                Some(index) => {
                    warn!("Dropping an incomplete stored provenance: {}", error);
                    Ok((StoredProvenances::from_str(&s[..index])?, true))
                }
                None => Err(error),
            },
        }
    }

    fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&VersionedStoredProvenances {
            version: VERSION,
            content: self,
        })
    }
}

/// Stores results in a TOML file. The file is loaded once on open, and every write
/// appends one record to it. A record written later for the same identifier and origin
/// replaces the earlier one when the file is loaded. Files with replaced records are
/// compacted on open and on removal.
pub struct FileProvenanceStorage {
    path: PathBuf,
    records: InMemoryProvenanceStorage,
    file: Mutex<()>,
}

impl FileProvenanceStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<FileProvenanceStorage, StorageError> {
        let path = path.into();
        let records = InMemoryProvenanceStorage::new();

        let needs_compaction = if path.exists() {
            debug!("Loading stored provenances from {}", path.display());
            let (stored, truncated) =
                StoredProvenances::recover_from_str(&std::fs::read_to_string(&path)?)?;
            for record in &stored.records {
                records.insert(&record.id, &record.origin, &record.result);
            }
            truncated || records.len() < stored.records.len()
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            true
        };

        let storage = FileProvenanceStorage {
            path,
            records,
            file: Mutex::new(()),
        };
        if needs_compaction {
            storage.compact()?;
        }
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the whole file from memory.
    fn compact(&self) -> Result<(), StorageError> {
        let _guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = StoredProvenances {
            records: self
                .records
                .snapshot()
                .into_iter()
                .map(|(id, origin, result)| StoredRecord { id, origin, result })
                .collect(),
        };
        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        std::fs::write(&temporary, stored.to_string()?)?;
        std::fs::rename(&temporary, &self.path)?;
        trace!(
            "Wrote {} stored provenances to {}",
            stored.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl ProvenanceStorage for FileProvenanceStorage {
    fn read(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
    ) -> Result<Option<ResolutionResult>, StorageError> {
        self.records.read(id, origin)
    }

    fn write(
        &self,
        id: &Identifier,
        origin: &OriginDescriptor,
        result: &ResolutionResult,
    ) -> Result<(), StorageError> {
        let record = toml::to_string(&AppendedRecord {
            records: [StoredRecordRef { id, origin, result }],
        })?;

        // Memory and file see the writes to one key in the same order.
        let _guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(format!("\n{record}").as_bytes())?;
        self.records.insert(id, origin, result);
        trace!("Appended the {} result of {}", origin.origin(), id);
        Ok(())
    }

    fn read_all(&self, id: &Identifier) -> Result<Vec<ResolutionResult>, StorageError> {
        self.records.read_all(id)
    }

    fn remove(&self, id: &Identifier) -> Result<usize, StorageError> {
        let removed = self.records.remove(id)?;
        if removed > 0 {
            self.compact()?;
        }
        Ok(removed)
    }
}
