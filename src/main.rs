//! hawkdb - MySQL result-set exporter
//!
//! Runs a query against a saved connection profile and streams the result
//! into a CSV file, an Excel workbook or a SQL INSERT script.
//!
//! # Usage
//!
//! ```bash
//! hawkdb profile save local --host localhost --user root -d shop
//! hawkdb export -p local -e "SELECT * FROM users" -o users.xlsx
//! ```

use hawkdb::cli::CliInterface;
use hawkdb::error::Result;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, set up logging and run the selected subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    // Ctrl+C cancels the running export; the job cleans up its partial file
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => token.cancel(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let result = cli.execute(cancel).await;
    ctrl_c_handle.abort();
    result
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
