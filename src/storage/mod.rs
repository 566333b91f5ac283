pub mod json_backend;

use std::path::Path;

use crate::{errors::EngineError, store::Planner};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Abstraction over persistence backends capable of storing planner snapshots.
///
/// The engine itself never writes through this trait mid-command; snapshots
/// are persisted whole, after a command has committed in memory.
pub trait StorageBackend: Send + Sync {
    fn save(&self, planner: &Planner, name: &str) -> Result<()>;
    fn load(&self, name: &str) -> Result<Planner>;
    fn list(&self) -> Result<Vec<String>>;
    fn delete(&self, name: &str) -> Result<()>;

    /// Ad-hoc file operations; default implementations forward to the JSON
    /// codec when not overridden.
    fn save_to_path(&self, planner: &Planner, path: &Path) -> Result<()> {
        json_backend::save_planner_to_path(planner, path)
    }

    fn load_from_path(&self, path: &Path) -> Result<Planner> {
        json_backend::load_planner_from_path(path)
    }
}

pub use json_backend::JsonStorage;
