// nodestore-cli: Clap commands, logging setup, table/JSON output
// Depends on nodestore-core (config) and nodestore-store (operations)

pub mod commands;
pub mod display;
pub mod logging;
pub mod output;

pub use commands::run;
