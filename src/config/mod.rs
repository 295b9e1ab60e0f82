//! Bootstrap configuration: a flat, versionless JSON file loaded once at process start, with
//! a load/save/default shape. No schema-migration machinery — this config has no accumulated
//! history to migrate from.

mod bootstrap;

pub use bootstrap::{BootstrapConfig, CloudBootstrapEntry};
