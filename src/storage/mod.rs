pub mod gateway;
pub mod postgres;
pub mod settings;
pub mod sqlite;
pub mod trait_def;

pub use gateway::{PersistReport, StepOutcome, StorageGateway};
pub use postgres::PostgresStorage;
pub use settings::StorageSettings;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, TableCounts};
