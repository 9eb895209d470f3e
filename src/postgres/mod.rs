// PostgreSQL support
//
// - config: options and credential lookup into a tokio_postgres config
// - params: RowValues binding
// - query: result extraction
// - session: the client session and its pool manager

mod config;
mod params;
mod query;
mod session;

pub use config::{pg_config, read_password};
pub use params::as_refs;
pub use query::postgres_extract_value;
pub use session::{PgManager, PgSession};
