//! Drivers - concrete implementations of the strand-core capability traits
//!
//! The core crate only knows `PromptDriver`, `EmbeddingDriver`,
//! `FileManagerDriver` and `Tool`. This crate supplies implementations that
//! need no network access, so structures can run end to end from the CLI
//! and from tests:
//!
//! - `prompt` - mock, echo and deliberately failing prompt drivers
//! - `embedding` - deterministic feature-hashing embeddings
//! - `file_manager` - local filesystem access rooted at a working directory
//! - `loaders` - text and blob loaders built on a file manager
//! - `config` - maps the `[drivers]` config section onto a `DriversConfig`
//!
//! Vendor-backed drivers plug in by implementing the same traits.

pub mod config;
pub mod embedding;
pub mod file_manager;
pub mod loaders;
pub mod prompt;

pub use config::drivers_from_settings;
pub use embedding::HashEmbeddingDriver;
pub use file_manager::LocalFileManagerDriver;
pub use loaders::{BlobLoader, Encoding, FileLoader, LoaderError, TextLoader};
pub use prompt::{EchoPromptDriver, MockFailingPromptDriver, MockPromptDriver};
