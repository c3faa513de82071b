//! Trellis command-line tool.
//!
//! Multi-agent collaborative editing of a versioned document tree with
//! optimistic concurrency: read-for-edit, submit, and resolve conflicts
//! explicitly when concurrent edits collide.

#![forbid(unsafe_code)]

mod commands;
mod markdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trellis_storage::SqliteStore;

/// Exit code for "the operation ran, but a conflict needs resolution".
const EXIT_CONFLICT: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    about = "Versioned document tree with multi-agent conflict resolution"
)]
struct Cli {
    /// Storage directory for the document database.
    #[arg(long, global = true, default_value = ".trellis")]
    db: PathBuf,

    /// Agent identity; falls back to the TRELLIS_AGENT environment variable.
    #[arg(long, global = true)]
    agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the document root.
    Init {
        /// Title of the root node.
        #[arg(long, default_value = "Document")]
        title: String,
    },

    /// Add a node under a parent.
    Add {
        /// Parent node id.
        #[arg(long)]
        parent: String,

        /// Title of the new node.
        #[arg(long)]
        title: String,

        /// Initial content; use "-" to read from stdin.
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Import a markdown file as the document tree.
    Load {
        /// Markdown file to import.
        file: PathBuf,
    },

    /// Export the document tree as markdown.
    Export {
        /// Output file; stdout when omitted.
        file: Option<PathBuf>,
    },

    /// Show the document tree.
    Tree,

    /// Show a node without declaring edit intent.
    Peek {
        /// Node id.
        node: String,
    },

    /// Read a node and declare intent to edit it.
    Read {
        /// Node id.
        node: String,
    },

    /// Submit new content for a node.
    Edit {
        /// Node id.
        node: String,

        /// New content; use "-" to read from stdin.
        #[arg(long)]
        content: Option<String>,

        /// File holding the new content.
        #[arg(long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// One-line description of the edit's intent.
        #[arg(long)]
        summary: Option<String>,

        /// Conflict strategy: prompt, auto or force.
        #[arg(long, default_value = "prompt")]
        strategy: String,
    },

    /// Resolve a stored conflict.
    Resolve {
        /// Node id.
        node: String,

        /// ACCEPT_YOURS, ACCEPT_THEIRS, ACCEPT_AUTO_MERGE or MANUAL_MERGE.
        resolution: String,

        /// Merged content for MANUAL_MERGE; use "-" to read from stdin.
        #[arg(long)]
        content: Option<String>,
    },

    /// Rename a node.
    Title {
        /// Node id.
        node: String,

        /// New title.
        title: String,
    },

    /// Attach a one-line summary to a node.
    Summarize {
        /// Node id.
        node: String,

        /// Summary text.
        summary: String,
    },

    /// Show this agent's pending reads, conflicts and recent edits.
    Status,

    /// List stored conflicts.
    Conflicts {
        /// Show conflicts for all agents, not just this one.
        #[arg(long)]
        all: bool,
    },

    /// List every agent seen in the document's history.
    Agents,

    /// Print the effective agent name, or suggest a free one.
    Whoami,

    /// Search titles and content.
    Search {
        /// Substring to look for.
        query: String,

        /// Match case exactly instead of case-insensitively.
        #[arg(long)]
        case_sensitive: bool,
    },

    /// Show a node's edit history.
    History {
        /// Node id.
        node: String,
    },

    /// Restore a historical version as a new version.
    Rollback {
        /// Node id.
        node: String,

        /// Version to restore.
        version: i64,
    },

    /// Simulate an edit without changing anything.
    DryRun {
        /// Node id.
        node: String,

        /// Content to simulate; use "-" to read from stdin.
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Sweep stale pending reads and conflicts.
    Cleanup {
        /// Pending-read TTL in seconds.
        #[arg(long, default_value = "3600")]
        reads_ttl: u64,

        /// Stored-conflict TTL in seconds.
        #[arg(long, default_value = "86400")]
        conflicts_ttl: u64,
    },

    /// Report database health.
    Check,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open(&cli.db)?;
    let agent = cli
        .agent
        .or_else(|| std::env::var("TRELLIS_AGENT").ok());

    match cli.command {
        Commands::Init { title } => commands::init(&mut store, &title, agent.as_deref()),
        Commands::Add {
            parent,
            title,
            content,
        } => commands::add(&mut store, &parent, &title, &content, agent.as_deref()),
        Commands::Load { file } => commands::load(&mut store, &file, agent.as_deref()),
        Commands::Export { file } => commands::export(&store, file.as_deref()),
        Commands::Tree => commands::tree(&store),
        Commands::Peek { node } => commands::peek(&store, &node),
        Commands::Read { node } => commands::read(&mut store, &node, agent.as_deref()),
        Commands::Edit {
            node,
            content,
            file,
            summary,
            strategy,
        } => commands::edit(
            &mut store,
            &node,
            content.as_deref(),
            file.as_deref(),
            summary,
            &strategy,
            agent.as_deref(),
        ),
        Commands::Resolve {
            node,
            resolution,
            content,
        } => commands::resolve(&mut store, &node, &resolution, content.as_deref(), agent.as_deref()),
        Commands::Title { node, title } => {
            commands::title(&mut store, &node, &title, agent.as_deref())
        }
        Commands::Summarize { node, summary } => {
            commands::summarize(&mut store, &node, &summary, agent.as_deref())
        }
        Commands::Status => commands::status(&store, agent.as_deref()),
        Commands::Conflicts { all } => commands::conflicts(&store, all, agent.as_deref()),
        Commands::Agents => commands::agents(&store),
        Commands::Whoami => commands::whoami(&store, agent.as_deref()),
        Commands::Search {
            query,
            case_sensitive,
        } => commands::search(&store, &query, case_sensitive),
        Commands::History { node } => commands::history(&store, &node),
        Commands::Rollback { node, version } => {
            commands::rollback(&mut store, &node, version, agent.as_deref())
        }
        Commands::DryRun { node, content } => {
            commands::dry_run(&store, &node, &content, agent.as_deref())
        }
        Commands::Cleanup {
            reads_ttl,
            conflicts_ttl,
        } => commands::cleanup(&mut store, reads_ttl, conflicts_ttl),
        Commands::Check => commands::check(&store),
    }
}
