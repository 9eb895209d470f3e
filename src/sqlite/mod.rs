// SQLite support
//
// - connection: the shared rusqlite handle and blocking-pool execution
// - manager: pool manager for running SQLite behind the networked adapter
// - params: RowValues to rusqlite values
// - query: result extraction

mod connection;
mod manager;
mod params;
mod query;

pub use connection::SqliteConnection;
pub use manager::SqliteManager;
pub use params::row_value_to_sqlite_value;
pub use query::sqlite_extract_value_sync;
