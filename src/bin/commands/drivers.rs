use anyhow::Result;
use clap::Args;
use dbkit::{Databases, OutputFormat};
use serde::Serialize;

use super::{print_rows, to_row};

/// Arguments for the Drivers command
#[derive(Args)]
pub struct DriversArgs {}

#[derive(Debug, Serialize)]
struct DriverInfo {
    driver: String,
    aliases: String,
}

pub fn run(databases: &Databases, _args: DriversArgs, output_format: OutputFormat) -> Result<()> {
    let registry = databases.registry();
    let rows = registry
        .drivers()
        .into_iter()
        .map(|driver| {
            let aliases = registry.aliases_of(&driver).join(", ");
            to_row(&DriverInfo { driver, aliases })
        })
        .collect::<Result<Vec<_>>>()?;

    print_rows(&rows, output_format);
    Ok(())
}
