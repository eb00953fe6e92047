use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// South Lake: inspect and edit a South Lake document database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the database. Defaults to the nearest directory, starting
    /// from the current one, that already contains it.
    #[arg(long, global = true, env = "SOUTHLAKE_STORE")]
    pub store: Option<PathBuf>,

    /// Name of the database inside the store directory.
    #[arg(long, global = true, env = "SOUTHLAKE_DATABASE", default_value = "southlake")]
    pub name: String,

    /// Increase verbosity (use multiple times for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if needed and write the default sections into it.
    Init,
    /// List the sections and their children.
    Sections,
    /// List the tags with the number of files carrying each.
    Tags,
    /// List the files.
    Files,
    /// Show which significant nodes were found.
    Status,
    /// Add a file.
    AddFile(AddFileArgs),
    /// Add tags to an existing file.
    Tag(TagArgs),
}

#[derive(Args, Debug)]
pub struct AddFileArgs {
    /// Title of the new file.
    pub title: String,

    /// Filetype of the content (uti, extension or MIME type).
    #[arg(long, default_value = "net.daringfireball.markdown")]
    pub filetype: String,

    /// Tags to attach (repeatable).
    #[arg(long, short)]
    pub tag: Vec<String>,

    /// Read the file content from this path.
    #[arg(long)]
    pub content_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TagArgs {
    /// Id of the file.
    pub id: String,

    /// Tags to add.
    #[arg(required = true)]
    pub tags: Vec<String>,
}
