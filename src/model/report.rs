use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Identifier, ParseError, Provenance};

/// Per-package outcome of a batch resolution, written next to the analysed project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceReport {
    #[serde(default)]
    pub packages: Vec<PackageProvenance>,
}

const VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct VersionedReport<'a> {
    pub version: i64,
    #[serde(flatten)]
    pub content: &'a ProvenanceReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageProvenance {
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl ProvenanceReport {
    pub fn from_file(file: &Path) -> Result<ProvenanceReport, ParseError> {
        ProvenanceReport::from_str(&std::fs::read_to_string(file)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<ProvenanceReport, ParseError> {
        let mut table = toml::from_str::<toml::Table>(s)?;
        match table.remove("version") {
            Some(toml::Value::Integer(VERSION)) => {
                table.try_into::<ProvenanceReport>().map_err(Into::into)
            }
            Some(other) => Err(ParseError::UnsupportedVersion(other)),
            None => Err(ParseError::MissingVersion),
        }
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&VersionedReport {
            version: VERSION,
            content: self,
        })
    }

    pub fn resolved_count(&self) -> usize {
        self.packages
            .iter()
            .filter(|package| package.provenance.is_some())
            .count()
    }
}
