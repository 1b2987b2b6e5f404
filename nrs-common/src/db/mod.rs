//! Response storage: participants and rounds

pub mod init;
pub mod migrations;
pub mod models;
pub mod participants;
pub mod rounds;
pub mod schema_sync;
pub mod table_schemas;

pub use init::*;
pub use migrations::run_migrations;
pub use models::*;
pub use schema_sync::*;
pub use table_schemas::*;
