//! Database access shared across SitePulse services

pub mod init;
pub mod settings;

pub use init::init_database;
