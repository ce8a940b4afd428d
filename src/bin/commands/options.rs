use anyhow::Result;
use clap::Args;
use dbkit::{normalize_name, Databases, EnvOptions, OutputFormat};
use serde::Serialize;

use super::{print_rows, to_row};

/// Arguments for the Options command
#[derive(Args)]
pub struct OptionsArgs {
    /// Database name, overrides --db
    pub name: Option<String>,

    /// Also show the environment variables read for this name
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct OptionsInfo {
    name: String,
    driver: String,
    dsn: String,
    debug: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dsn_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_var: Option<String>,
}

pub fn run(
    databases: &Databases,
    env: &EnvOptions,
    db: &str,
    args: OptionsArgs,
    output_format: OutputFormat,
) -> Result<()> {
    let OptionsArgs { name, verbose } = args;
    let name = name.unwrap_or_else(|| db.to_string());
    let name = normalize_name(&name);

    let opts = databases.options(name)?;
    let var = |field: &str| verbose.then(|| env.var_name(field, name));

    let info = OptionsInfo {
        name: name.to_string(),
        driver: opts.driver,
        dsn: opts.dsn,
        debug: opts.debug,
        driver_var: var("driver"),
        dsn_var: var("dsn"),
        debug_var: var("debug"),
    };

    print_rows(&[to_row(&info)?], output_format);
    Ok(())
}
