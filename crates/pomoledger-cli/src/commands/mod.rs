pub mod config;
pub mod history;
pub mod project;
pub mod shell;

use pomoledger_core::{Config, Database};

/// Open the ledger named by the configuration.
pub fn open_database(config: &Config) -> Result<Database, Box<dyn std::error::Error>> {
    Ok(Database::open_at(config.database_path()?)?)
}
