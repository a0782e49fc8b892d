//! devtrack CLI - Command-line interface for the device inventory
//!
//! Works against a local `SQLite` document store; QR codes go to a local
//! directory, or to Cloudflare R2 when the `R2_*` variables are set.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, DepartmentCommands, DeviceCommands, ErrorCommands, UserCommands};
use crate::commands::common::{resolve_blob_dir, resolve_db_path, Context};
use crate::commands::devices::EditArgs;
use crate::commands::{departments, devices, errors, stats, users};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "devtrack=info".parse::<tracing_subscriber::filter::Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let blob_dir = resolve_blob_dir(cli.blob_dir);
    let ctx = Context::open(&db_path, &blob_dir)?;

    match cli.command {
        Commands::Departments(command) => match command {
            DepartmentCommands::List { json } => departments::run_list(json, &ctx).await?,
            DepartmentCommands::Add { name } => departments::run_add(&name, &ctx).await?,
            DepartmentCommands::Delete { department, yes } => {
                departments::run_delete(&department, yes, &ctx).await?;
            }
        },
        Commands::Devices(command) => match command {
            DeviceCommands::List {
                department,
                search,
                json,
            } => {
                devices::run_list(department.as_deref(), search.as_deref(), json, &ctx).await?;
            }
            DeviceCommands::Add {
                name,
                kind,
                department,
            } => devices::run_add(&name, &kind, &department, &ctx).await?,
            DeviceCommands::Show { id, json } => devices::run_show(&id, json, &ctx).await?,
            DeviceCommands::Edit {
                id,
                name,
                department,
                user,
                note,
                specs,
                clear_specs,
            } => {
                let args = EditArgs {
                    name,
                    department,
                    user,
                    note,
                    specs,
                    clear_specs,
                };
                devices::run_edit(&id, args, &ctx).await?;
            }
            DeviceCommands::Watch {
                department,
                interval_ms,
            } => devices::run_watch(&department, interval_ms, &ctx).await?,
        },
        Commands::Users(command) => match command {
            UserCommands::List { department, json } => {
                users::run_list(department.as_deref(), json, &ctx).await?;
            }
            UserCommands::Add {
                fullname,
                department,
            } => users::run_add(&fullname, &department, &ctx).await?,
        },
        Commands::Errors(ErrorCommands::Add {
            device_name,
            message,
        }) => errors::run_add(&device_name, message, &ctx).await?,
        Commands::Stats { filter, json } => stats::run_stats(&filter, json, &ctx).await?,
    }

    Ok(())
}
