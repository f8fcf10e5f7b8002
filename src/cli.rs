use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docfuse",
    about = "Local-first hybrid document retrieval engine"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage document collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Manage hierarchical path-context annotations
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Crawl collection directories and (re)index their files
    Index(IndexArgs),
    /// Hybrid search across collections
    Query(QueryArgs),
    /// Vector-only search across collections
    Vsearch(VsearchArgs),
    /// Run the background embedding job
    Embed(EmbedArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Collection subcommands --

#[derive(Debug, Subcommand)]
pub enum CollectionAction {
    /// Register a directory as a named collection and index its contents
    Add {
        /// Path to the directory
        path: PathBuf,
        /// Human-readable collection name
        #[arg(long)]
        name: String,
        /// Restrict indexing to relative paths matching this glob
        #[arg(long)]
        glob: Option<String>,
    },
    /// Remove a collection; its documents are soft-deleted
    Remove {
        /// Name of the collection to remove
        name: String,
    },
    /// List all registered collections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Context subcommands --

#[derive(Debug, Subcommand)]
pub enum ContextAction {
    /// Add or update a context annotation for a path prefix
    Add {
        /// Collection name
        collection: String,
        /// Path prefix within the collection ("" for the root)
        prefix: String,
        /// Free-text description inherited by documents under the prefix
        description: String,
    },
    /// Remove a context annotation
    Remove {
        /// Collection name
        collection: String,
        /// Path prefix within the collection
        prefix: String,
    },
    /// List context annotations
    List {
        /// Restrict to a collection
        #[arg(short = 'c', long)]
        collection: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Index only this collection
    #[arg(short = 'c', long)]
    pub collection: Option<String>,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Search only within this collection
    #[arg(short = 'c', long)]
    pub collection: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Vector-only search --

#[derive(Debug, Parser)]
pub struct VsearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Search only within this collection
    #[arg(short = 'c', long)]
    pub collection: Option<String>,

    /// Minimum similarity score
    #[arg(long, default_value = "0.0")]
    pub min_score: f32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Embed --

#[derive(Debug, Parser)]
pub struct EmbedArgs {
    /// Embed only this collection's documents
    #[arg(short = 'c', long)]
    pub collection: Option<String>,

    /// Clear existing embeddings and recompute everything
    #[arg(long)]
    pub force: bool,

    /// Emit progress events as JSON lines instead of a progress bar
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docfuse",
            &mut std::io::stdout(),
        );
    }
}
