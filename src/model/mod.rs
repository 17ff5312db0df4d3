use thiserror::Error;

pub mod identifier;
pub mod package;
pub mod provenance;
pub mod report;

pub use identifier::Identifier;
pub use package::{Hash, Package, PackageList, RemoteArtifact, SourceCodeOrigin, VcsInfo, VcsType};
pub use provenance::{
    ArtifactProvenance, OriginDescriptor, Provenance, RepositoryProvenance, ResolutionResult,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading file: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid identifier `{0}`, expected `Type:Namespace:Name:Version`")]
    InvalidIdentifier(String),
    #[error("Invalid VCS type `{0}`")]
    InvalidVcsType(String),
    #[error("Invalid source code origin `{0}`")]
    InvalidSourceCodeOrigin(String),
    #[error("Invalid re-resolution policy `{0}`, expected `never`, `unresolved` or `all`")]
    InvalidReResolution(String),
    #[error("Unsupported file version {0}")]
    UnsupportedVersion(toml::Value),
    #[error("Missing file version")]
    MissingVersion,
}
