//! Command-line interface for hawkdb
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Dispatch of the `export`, `profile`, `config`, `completion` and
//!   `version` subcommands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tabled::Table;
use tabled::settings::Style;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Config, ExportConfig, LogLevel};
use crate::connection::{Credentials, MySqlSession};
use crate::error::{HawkError, Result};
use crate::export::{
    BinaryPolicy, ExportFormat, ExportJob, ExportRequest, ExportSummary, JobStatus,
    ProgressTracker, SqlDialect,
};
use crate::profiles::{ConnectionProfile, DEFAULT_PORT, ProfileStore};

pub mod completion;

/// hawkdb - export MySQL query results to CSV, Excel or SQL
#[derive(Parser, Debug)]
#[command(
    name = "hawkdb",
    version,
    about = "Export MySQL query results to CSV, Excel or SQL INSERT scripts",
    long_about = "Runs a read query against a MySQL server described by a saved connection
profile and streams the result set into a CSV file, an Excel workbook or a
script of INSERT statements."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for hawkdb
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query and export its result to a file
    Export(ExportArgs),

    /// Manage saved connection profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Arguments of `hawkdb export`
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Connection profile to use
    #[arg(short = 'p', long, value_name = "NAME")]
    pub profile: String,

    /// SQL query to run
    #[arg(
        short = 'e',
        long,
        value_name = "SQL",
        conflicts_with = "query_file",
        required_unless_present = "query_file"
    )]
    pub query: Option<String>,

    /// File holding the SQL query
    #[arg(short = 'f', long, value_name = "PATH")]
    pub query_file: Option<PathBuf>,

    /// Destination file (default: export-<timestamp>.<ext> in the current directory)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output format; inferred from the destination extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<ExportFormat>,

    /// Target table for SQL output (default: inferred from the query)
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,

    /// Rows per INSERT statement
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,

    /// SQL dialect for INSERT scripts
    #[arg(long, value_enum)]
    pub dialect: Option<SqlDialect>,

    /// How CSV output handles binary values
    #[arg(long, value_enum)]
    pub binary: Option<BinaryPolicy>,

    /// Password for the connection
    #[arg(long, env = "HAWKDB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep the partial file when the export is cancelled
    #[arg(long)]
    pub keep_partial: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

/// Subcommands of `hawkdb profile`
#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// List saved profiles
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Print profile names only, one per line
        #[arg(long, hide = true)]
        names: bool,
    },

    /// Save a profile
    Save {
        /// Profile name
        name: String,

        /// Server host
        #[arg(long)]
        host: String,

        /// Server port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// User name
        #[arg(short = 'u', long)]
        user: String,

        /// Default database
        #[arg(short = 'd', long, default_value = "")]
        database: String,

        /// Replace an existing profile with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Show one profile
    Show {
        /// Profile name
        name: String,
    },

    /// Delete a profile
    Delete {
        /// Profile name
        name: String,
    },

    /// Connect with a profile and report the server version
    Test {
        /// Profile name
        name: String,

        /// Password for the connection
        #[arg(long, env = "HAWKDB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build the interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.validate()?;

        Self::apply_logging_args(&mut config, args);
        Ok(config)
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    fn profile_store(&self) -> ProfileStore {
        ProfileStore::new(&self.config.profiles.file_path)
    }

    /// Run the selected subcommand
    ///
    /// # Arguments
    /// * `cancel` - Token triggered by Ctrl+C
    pub async fn execute(&self, cancel: CancellationToken) -> Result<()> {
        match &self.args.command {
            Commands::Export(args) => self.run_export(args, cancel).await,
            Commands::Profile(command) => self.handle_profile_command(command).await,
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate),
            Commands::Completion { shell } => completion::generate_completion(shell),
            Commands::Version => {
                self.show_version();
                Ok(())
            }
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("hawkdb version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    async fn run_export(&self, args: &ExportArgs, cancel: CancellationToken) -> Result<()> {
        let profile = self.profile_store().load(&args.profile)?;
        let query = read_query(args)?;
        let format = resolve_format(args.format, args.output.as_deref())?;
        let destination = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format.default_file_name()));
        let export_config = export_overrides(&self.config.export, args);

        debug!(
            "Export request: profile '{}', format {}, destination {}",
            profile.name,
            format,
            destination.display()
        );

        let request = ExportRequest {
            query,
            profile,
            format,
            destination,
        };

        let show_progress = export_config.progress_bar && !args.no_progress && !self.args.quiet;
        let tracker = Arc::new(ProgressTracker::new(show_progress));
        let progress = Arc::clone(&tracker);

        let mut job = ExportJob::from_config(request, &export_config, args.table.clone())
            .with_cancellation(cancel)
            .on_progress(move |rows| progress.update(rows));

        let credentials = Credentials::new(args.password.clone().unwrap_or_default());
        let result = job.run(&credentials, &self.config.connection).await;
        tracker.finish();

        self.report_summary(&result?)
    }

    fn report_summary(&self, summary: &ExportSummary) -> Result<()> {
        match summary.status {
            JobStatus::Cancelled => {
                if let Some(path) = &summary.path {
                    eprintln!("Partial output kept at {}", path.display());
                }
                Err(HawkError::Generic(format!(
                    "export cancelled after {} rows",
                    summary.rows
                )))
            }
            _ => {
                if !self.args.quiet {
                    let path = summary
                        .path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "Exported {} rows to {} ({} bytes, {} ms)",
                        summary.rows, path, summary.bytes, summary.elapsed_ms
                    );
                }
                Ok(())
            }
        }
    }

    async fn handle_profile_command(&self, command: &ProfileCommand) -> Result<()> {
        let store = self.profile_store();

        match command {
            ProfileCommand::List { json, names } => {
                let profiles = store.list()?;
                if *names {
                    for p in &profiles {
                        println!("{}", p.name);
                    }
                } else if *json {
                    let out = serde_json::to_string_pretty(&profiles)
                        .map_err(|e| HawkError::Generic(e.to_string()))?;
                    println!("{}", out);
                } else if profiles.is_empty() {
                    println!("No profiles saved in {}", store.path().display());
                } else {
                    println!("{}", Table::new(&profiles).with(Style::modern()));
                }
                Ok(())
            }
            ProfileCommand::Save {
                name,
                host,
                port,
                user,
                database,
                overwrite,
            } => {
                let profile = ConnectionProfile::new(name, host, *port, user, database);
                store.save(&profile, *overwrite)?;
                if !self.args.quiet {
                    println!("Saved profile '{}'", name);
                }
                Ok(())
            }
            ProfileCommand::Show { name } => {
                let profile = store.load(name)?;
                println!("{}", Table::new([profile]).with(Style::modern()));
                Ok(())
            }
            ProfileCommand::Delete { name } => {
                store.delete(name)?;
                if !self.args.quiet {
                    println!("Deleted profile '{}'", name);
                }
                Ok(())
            }
            ProfileCommand::Test { name, password } => {
                let profile = store.load(name)?;
                let credentials = Credentials::new(password.clone().unwrap_or_default());
                let mut session =
                    MySqlSession::connect(&profile, &credentials, &self.config.connection).await?;
                let version = session.server_version().await?;
                session.close().await?;
                println!(
                    "Connected to {}:{} as {} (MySQL {})",
                    profile.host, profile.port, profile.user, version
                );
                Ok(())
            }
        }
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults are in effect");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Configuration file: {}", path.display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

/// Query text from `--query` or `--query-file`
fn read_query(args: &ExportArgs) -> Result<String> {
    let query = match (&args.query, &args.query_file) {
        (Some(q), _) => q.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(HawkError::Generic(
                "either --query or --query-file is required".into(),
            ));
        }
    };

    if query.trim().is_empty() {
        return Err(HawkError::Generic("query is empty".into()));
    }
    Ok(query)
}

/// Explicit format, else the destination extension, else CSV
fn resolve_format(explicit: Option<ExportFormat>, output: Option<&Path>) -> Result<ExportFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    match output {
        None => Ok(ExportFormat::Csv),
        Some(path) => ExportFormat::from_path(path).ok_or_else(|| {
            HawkError::Generic(format!(
                "cannot infer the export format from {}; use --format csv|xlsx|sql",
                path.display()
            ))
        }),
    }
}

/// Export configuration with command-line overrides applied
fn export_overrides(base: &ExportConfig, args: &ExportArgs) -> ExportConfig {
    let mut config = base.clone();
    if let Some(n) = args.batch_size {
        config.batch_size = usize::try_from(n).unwrap_or(usize::MAX);
    }
    if let Some(dialect) = args.dialect {
        config.dialect = dialect;
    }
    if let Some(binary) = args.binary {
        config.binary = binary;
    }
    config.keep_partial |= args.keep_partial;
    config
}
