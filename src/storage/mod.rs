// Persistence: the SQLite dataset table and the read-side repository over it.

pub mod repository;
pub mod sqlite;

pub use repository::DatasetRepository;
pub use sqlite::{SqliteStorage, UpsertOutcome};
