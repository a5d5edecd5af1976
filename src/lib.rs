//! hawkdb library
//!
//! Streams MySQL query results into CSV, Excel and SQL INSERT files, and
//! manages the connection profiles those exports run against.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MySQL sessions and cursors
//! - `error`: Error types and handling
//! - `export`: Row streaming, format writers and the export job
//! - `profiles`: Saved connection profiles
//! - `value`: Logical values, column schemas and type coercion
//!
//! # Example
//!
//! ```no_run
//! use hawkdb::{Config, ProfileStore};
//!
//! fn main() -> hawkdb::Result<()> {
//!     let config = Config::default();
//!     let store = ProfileStore::new(&config.profiles.file_path);
//!     for profile in store.list()? {
//!         println!("{} -> {}:{}", profile.name, profile.host, profile.port);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod profiles;
pub mod value;

// Re-export commonly used types
pub use config::Config;
pub use error::{HawkError, Result};
pub use export::{ExportFormat, ExportJob};
pub use profiles::{ConnectionProfile, ProfileStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
