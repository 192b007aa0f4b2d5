//! CLI argument definitions for Logbook.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{ItemStatus, ItemType, LinkType, Priority};

/// Version string with the commit and build time baked in by build.rs.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("LB_GIT_COMMIT"),
    ", built ",
    env!("LB_BUILD_TIMESTAMP"),
    ")"
);

/// Logbook - tasks, learning goals, research notes and thoughts, with typed
/// links between them.
#[derive(Parser, Debug)]
#[command(name = "lb")]
#[command(author, version, long_version = LONG_VERSION, about = "A local-first logbook for work items and the links between them", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Database file to use. Can also be set via LB_DB.
    #[arg(long = "db", global = true)]
    pub database: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if needed and bring its schema up to date
    Init,

    /// Apply pending schema migrations and show the ledger
    Migrate,

    /// Add a new item
    Add {
        /// Goal the item belongs to (e.g., "Proj")
        goal: String,

        /// Item title
        title: String,

        /// Item type (task, learning, research, thought)
        #[arg(short = 't', long = "type", default_value = "task", value_parser = parse_item_type)]
        item_type: ItemType,

        /// Priority (low, med, hi or 1-3); defaults to the configured default
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,

        /// Item description
        #[arg(short, long)]
        description: Option<String>,

        /// Tags for the item
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Show an item with its tags and links
    Show {
        /// Item ID (e.g., pt311230pm)
        id: String,
    },

    /// List items
    List {
        /// Filter by goal (case-insensitive)
        #[arg(short, long)]
        goal: Option<String>,

        /// Filter by type
        #[arg(short = 't', long = "type", value_parser = parse_item_type)]
        item_type: Option<ItemType>,

        /// Filter by status
        #[arg(short, long, value_parser = parse_status)]
        status: Option<ItemStatus>,

        /// Filter by priority
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,

        /// Filter by tag
        #[arg(long)]
        tag: Option<String>,

        /// Only items whose title or description contains this text
        #[arg(long)]
        contains: Option<String>,
    },

    /// Set an item's status
    Status {
        /// Item ID
        id: String,

        /// New status (not_started, in_progress, completed)
        #[arg(value_parser = parse_status)]
        status: ItemStatus,
    },

    /// Set an item's priority
    Priority {
        /// Item ID
        id: String,

        /// New priority (low, med, hi or 1-3)
        #[arg(value_parser = parse_priority)]
        priority: Priority,
    },

    /// Update an item's fields and links in one step
    Update {
        /// Item ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New goal
        #[arg(long)]
        goal: Option<String>,

        /// New type
        #[arg(short = 't', long = "type", value_parser = parse_item_type)]
        item_type: Option<ItemType>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New priority
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,

        /// New status
        #[arg(short, long, value_parser = parse_status)]
        status: Option<ItemStatus>,

        /// Link to another item (TARGET or TARGET:TYPE); repeatable
        #[arg(long = "link", value_parser = parse_link_spec)]
        link: Vec<(String, LinkType)>,

        /// Remove the link to another item; repeatable
        #[arg(long = "unlink")]
        unlink: Vec<String>,
    },

    /// Delete one or more items (all or nothing)
    #[command(visible_alias = "rm")]
    Delete {
        /// Item IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Merge items that share a title, type and priority, keeping the oldest
    Merge,

    /// Link management commands (relationships between items)
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },

    /// Tag management commands
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },

    /// Full-text search over titles and descriptions
    Search {
        /// Words to search for
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// List all goals
    Goals,

    /// Export every row to a JSON snapshot
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a JSON snapshot; existing ids are skipped
    Import {
        /// Snapshot file
        input: PathBuf,
    },

    /// Reclaim unused space in the database file
    Vacuum,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Link subcommands
#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// Create a link from SOURCE to TARGET
    #[command(name = "add", visible_alias = "create")]
    Add {
        /// Source item ID
        source: String,
        /// Target item ID
        target: String,
        /// Type of relationship
        #[arg(long = "type", short = 't', default_value = "references", value_parser = parse_link_type)]
        link_type: LinkType,
    },

    /// Remove the link from SOURCE to TARGET
    Rm {
        /// Source item ID
        source: String,
        /// Target item ID
        target: String,
    },

    /// Show incoming and outgoing links of an item
    Show {
        /// Item ID
        id: String,
    },

    /// Walk outgoing links from an item, marking cycles and missing items
    Tree {
        /// Root item ID
        id: String,
        /// Stop expanding below this depth (root is depth 0)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Suggest link targets, most recently touched first
    Suggest {
        /// Only items of this goal
        #[arg(short, long)]
        goal: Option<String>,
        /// Maximum number of suggestions
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
}

/// Tag subcommands
#[derive(Subcommand, Debug)]
pub enum TagCommands {
    /// Tag an item
    Add {
        /// Item ID
        id: String,
        /// Tag name
        tag: String,
    },

    /// Remove a tag from an item
    Rm {
        /// Item ID
        id: String,
        /// Tag name
        tag: String,
    },

    /// List tags of an item, or every tag when no ID is given
    List {
        /// Item ID
        id: Option<String>,
    },

    /// List items carrying a tag
    Items {
        /// Tag name
        tag: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}

fn parse_item_type(s: &str) -> Result<ItemType, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_status(s: &str) -> Result<ItemStatus, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_link_type(s: &str) -> Result<LinkType, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

/// Parse `TARGET` or `TARGET:TYPE`.
fn parse_link_spec(s: &str) -> Result<(String, LinkType), String> {
    let (target, link_type) = match s.split_once(':') {
        Some((target, ty)) => (target, parse_link_type(ty)?),
        None => (s, LinkType::default()),
    };
    if target.is_empty() {
        return Err("link target cannot be empty".to_string());
    }
    Ok((target.to_string(), link_type))
}
