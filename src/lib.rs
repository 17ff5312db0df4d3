pub mod cache;
pub mod cli;
pub mod config;
pub mod flock;
pub mod model;
pub mod resolver;
pub mod storage;
pub mod vcs;

mod api;

pub use api::{Provenant, ProvenantBuilder};
