use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "devtrack")]
#[command(about = "Track departments, devices and their QR codes from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory QR images are written to when R2 is not configured
    #[arg(long, global = true, value_name = "DIR")]
    pub blob_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage departments
    #[command(subcommand, alias = "dept")]
    Departments(DepartmentCommands),
    /// Manage devices
    #[command(subcommand)]
    Devices(DeviceCommands),
    /// Manage users
    #[command(subcommand)]
    Users(UserCommands),
    /// Record device error reports
    #[command(subcommand)]
    Errors(ErrorCommands),
    /// Show usage statistics
    Stats {
        /// Only show keys containing this text (case-insensitive)
        #[arg(short, long, default_value = "")]
        filter: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DepartmentCommands {
    /// List departments
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a department
    Add {
        /// Department name
        name: String,
    },
    /// Delete a department that no device or user refers to
    Delete {
        /// Department name or ID
        department: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// List devices grouped by type
    List {
        /// Only devices of this department
        #[arg(short, long, value_name = "NAME")]
        department: Option<String>,
        /// Only devices matching this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a device
    Add {
        /// Device name
        name: String,
        /// Device type (cannot be changed later)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        kind: String,
        /// Department name
        #[arg(short, long, value_name = "NAME")]
        department: String,
    },
    /// Show one device with its QR payload
    Show {
        /// Device ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a device and republish its QR code
    Edit {
        /// Device ID or unique ID prefix
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New department name
        #[arg(long, value_name = "NAME")]
        department: Option<String>,
        /// New assignee full name
        #[arg(long)]
        user: Option<String>,
        /// New note
        #[arg(long)]
        note: Option<String>,
        /// Specification entry KEY=VALUE (repeatable, replaces all entries)
        #[arg(long = "spec", value_name = "KEY=VALUE")]
        specs: Vec<String>,
        /// Remove every specification entry
        #[arg(long, conflicts_with = "specs")]
        clear_specs: bool,
    },
    /// Print devices of a department whenever they change
    Watch {
        /// Department name
        department: String,
        /// Poll interval for changes made by other processes, in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List users
    List {
        /// Only users of this department
        #[arg(short, long, value_name = "NAME")]
        department: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a user
    Add {
        /// Full name
        fullname: String,
        /// Department name
        #[arg(short, long, value_name = "NAME")]
        department: String,
    },
}

#[derive(Subcommand)]
pub enum ErrorCommands {
    /// Record an error report against a device
    Add {
        /// Device name
        device_name: String,
        /// Description of the fault
        #[arg(short, long)]
        message: Option<String>,
    },
}
