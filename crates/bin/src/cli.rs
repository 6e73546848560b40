//! CLI argument definitions for the Outline binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Storage backend type
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Backend {
    /// SQLite database (default)
    Sqlite,
    /// In-memory with JSON persistence (for development and fixtures)
    Inmemory,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    #[default]
    Human,
    Json,
}

/// Nudge direction
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NudgeDirection {
    Up,
    Down,
}

/// Outline: edit the order of a course's modules, lessons and resources
#[derive(Parser, Debug)]
#[command(name = "outline")]
#[command(about = "Outline: ordered course outlines")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "human", env = "OUTLINE_FORMAT")]
    pub format: Format,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the course tree
    Show(ShowArgs),
    /// Append a new item to a container
    Add(AddArgs),
    /// Move an item within its container or into another one
    Move(MoveArgs),
    /// Move an item one step up or down
    Nudge(NudgeArgs),
    /// Delete an item and everything below it
    Delete(DeleteArgs),
}

/// Which course to open and where it is stored
#[derive(clap::Args, Debug)]
pub struct CourseArgs {
    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "OUTLINE_BACKEND")]
    pub backend: Backend,

    /// Data directory for storage files.
    /// For SQLite: stores outline.db
    /// For InMemory: stores outline.json
    #[arg(short = 'D', long, env = "OUTLINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Tenant that owns the course
    #[arg(short, long, default_value = "default", env = "OUTLINE_TENANT")]
    pub tenant: String,

    /// Course id; also the id of the root container
    #[arg(short, long, default_value = "course", env = "OUTLINE_COURSE")]
    pub course: String,

    /// Editor configuration file (JSON). Missing files use the defaults.
    #[arg(long, env = "OUTLINE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub course: CourseArgs,
}

/// Arguments for the add command
#[derive(clap::Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Title of the new item
    pub title: String,

    /// Container to append to (defaults to the course itself)
    #[arg(short, long)]
    pub parent: Option<String>,
}

/// Arguments for the move command
#[derive(clap::Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Item to move
    pub item: String,

    /// Destination index among the target's children
    pub index: usize,

    /// Destination container (defaults to the item's current container)
    #[arg(long)]
    pub to: Option<String>,
}

/// Arguments for the nudge command
#[derive(clap::Args, Debug)]
pub struct NudgeArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Item to nudge
    pub item: String,

    pub direction: NudgeDirection,
}

/// Arguments for the delete command
#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Item to delete
    pub item: String,
}
