//! sqlport CLI - export and import database tables as XML dumps.

use clap::{Args, Parser, Subcommand};
use sqlport::command::{run_export, run_import, CommandOptions};
use sqlport::config::{resolve_config, Config, DriverOptions};
use sqlport::core::Result;
use sqlport::factory::DatabaseFactory;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlport")]
#[command(about = "Export and import database tables as XML dumps")]
#[command(version)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[database]` section of the configuration.
#[derive(Args)]
struct ConnectionArgs {
    /// Adapter name: mysqli, mysql or sqlite
    #[arg(long, global = true, env = "SQLPORT_DRIVER")]
    driver: Option<String>,

    #[arg(long, global = true, env = "SQLPORT_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "SQLPORT_PORT")]
    port: Option<u16>,

    #[arg(long, global = true, env = "SQLPORT_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "SQLPORT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, env = "SQLPORT_DATABASE")]
    database: Option<String>,

    /// Table prefix substituted for `#__`
    #[arg(long, global = true, env = "SQLPORT_PREFIX")]
    prefix: Option<String>,

    /// Database file for the sqlite adapter
    #[arg(long, global = true, env = "SQLPORT_PATH")]
    path: Option<PathBuf>,
}

#[derive(Args)]
struct Selection {
    /// Process every table
    #[arg(long)]
    all: bool,

    /// Process a single table
    #[arg(long)]
    table: Option<String>,

    /// Folder holding the `<table>.xml` files
    #[arg(long, default_value = ".")]
    folder: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Export tables to XML files
    Export {
        #[command(flatten)]
        selection: Selection,

        /// Skip table structure
        #[arg(long)]
        no_structure: bool,

        /// Skip table rows
        #[arg(long)]
        no_data: bool,
    },

    /// Import tables from XML files
    Import {
        #[command(flatten)]
        selection: Selection,

        /// Load rows only, leaving the table structure untouched
        #[arg(long)]
        no_structure: bool,
    },
}

impl ConnectionArgs {
    fn apply(self, options: &mut DriverOptions) {
        if let Some(driver) = self.driver {
            options.driver = driver;
        }
        if let Some(prefix) = self.prefix {
            options.prefix = prefix;
        }
        options.host = self.host.or(options.host.take());
        options.port = self.port.or(options.port);
        options.user = self.user.or(options.user.take());
        options.password = self.password.or(options.password.take());
        options.database = self.database.or(options.database.take());
        options.path = self.path.or(options.path.take());
    }
}

fn command_options(selection: Selection, with_structure: bool, with_data: bool) -> CommandOptions {
    CommandOptions {
        all: selection.all,
        table: selection.table,
        folder: selection.folder,
        with_structure,
        with_data,
    }
}

fn run(cli: Cli) -> Result<i32> {
    let Config { mut database, export } = resolve_config(cli.config.as_deref())?;
    cli.connection.apply(&mut database);

    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver(&database.driver, &database)?;
    info!("Using {} adapter", driver.name());

    let mut out = io::stdout().lock();
    let code = match cli.command {
        Commands::Export { selection, no_structure, no_data } => {
            let defaults = export.as_ref();
            let with_structure = !no_structure && defaults.and_then(|e| e.with_structure).unwrap_or(true);
            let with_data = !no_data && defaults.and_then(|e| e.with_data).unwrap_or(true);
            let options = command_options(selection, with_structure, with_data);
            run_export(&factory, driver.as_mut(), &options, &mut out)?
        }
        Commands::Import { selection, no_structure } => {
            let options = command_options(selection, !no_structure, true);
            run_import(&factory, driver.as_mut(), &options, &mut out)?
        }
    };
    driver.disconnect();
    Ok(code)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
