use clap::{Parser, Subcommand};
use dbkit::{Databases, DriverRegistry, EnvOptions, OutputFormat};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::drivers::DriversArgs;
use commands::options::OptionsArgs;
use commands::query::QueryArgs;
use commands::sort::SortArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// TOML file with `db_*` keys, layered under the environment
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Prefix for the environment variables, e.g. APP for APP_DB_DSN
    #[clap(long, global = true)]
    env_prefix: Option<String>,

    /// Logical database name, the default database when omitted
    #[clap(long, global = true, default_value = "")]
    db: String,

    /// Output format: table, markdown, json, json-pretty, json-line, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered database drivers and their aliases
    Drivers(DriversArgs),

    /// Show the connection options a database name resolves to
    Options(OptionsArgs),

    /// Rewrite the sort position of rows in one statement
    Sort(SortArgs),

    /// Query a table with filters, paging and ordering
    Query(QueryArgs),
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    }

    let mut env = EnvOptions::new();
    if let Some(prefix) = &cli.env_prefix {
        env = env.with_prefix(prefix);
    }
    if let Some(path) = &cli.config {
        env = env.with_file(path);
    }

    let databases = Databases::new(DriverRegistry::with_defaults(), env.clone());

    let result = match cli.command {
        Commands::Drivers(args) => commands::drivers::run(&databases, args, cli.format),
        Commands::Options(args) => {
            commands::options::run(&databases, &env, &cli.db, args, cli.format)
        }
        Commands::Sort(args) => commands::sort::run(&databases, &cli.db, args, cli.format),
        Commands::Query(args) => commands::query::run(&databases, &cli.db, args, cli.format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
