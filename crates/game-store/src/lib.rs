//! Local persistence for saved games.
//!
//! `store` is the key/value collaborator, `library` the saved-game
//! operations built on it.

pub mod error;
pub mod library;
pub mod store;

pub use error::StoreError;
pub use library::{GameLibrary, SettingsPatch, StorageInfo, StorageSettings};
pub use store::{FileStore, KeyValueStore, MemoryStore};
