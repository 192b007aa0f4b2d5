//! Logbook CLI - tasks, learning goals, research notes and thoughts with typed links.

use clap::Parser;
use logbook::cli::{Cli, Commands, ConfigCommands, LinkCommands, TagCommands};
use logbook::commands::{self, AddArgs, Output};
use logbook::config::{ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use logbook::coordinator::Coordinator;
use logbook::models::{ItemFilter, ItemUpdate, LinkChanges};
use logbook::storage::{MigrationReport, Storage};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let mut overrides = ConfigOverrides::new().with_verbosity(cli.verbose);
    if let Some(ref path) = cli.database {
        overrides = overrides.with_database(path);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let mut human = cli.human_readable;
    let result = resolve_config(&overrides).and_then(|config| {
        init_logging(config.log_level());
        human = config.output_format() == OutputFormat::Human;
        run_command(cli.command, &config, human)
    });

    // Handle result
    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Send tracing output to stderr so stdout stays machine-readable.
fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Open the configured database and bring its schema up to date.
fn open(config: &ResolvedConfig) -> Result<(Coordinator, MigrationReport), logbook::Error> {
    let path = config.database();
    debug!(path = %path.display(), "opening database");
    let mut storage = Storage::open(path)?;
    let report = storage.migrate()?;
    Ok((Coordinator::new(storage)?, report))
}

fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<(), logbook::Error> {
    if let Commands::Config { command } = &command {
        match command {
            ConfigCommands::Show => output(&commands::config_show(config), human),
        }
        return Ok(());
    }

    let (mut coordinator, migrated) = open(config)?;
    let c = &mut coordinator;

    match command {
        Commands::Init | Commands::Migrate => {
            output(&commands::schema_status(c, migrated)?, human);
        }
        Commands::Add {
            goal,
            title,
            item_type,
            priority,
            description,
            tag,
        } => {
            let args = AddArgs {
                goal,
                title,
                item_type,
                priority: priority.unwrap_or_else(|| config.default_priority()),
                description,
                tags: tag,
            };
            output(&commands::item_add(c, args)?, human);
        }
        Commands::Show { id } => output(&commands::item_show(c, &id)?, human),
        Commands::List {
            goal,
            item_type,
            status,
            priority,
            tag,
            contains,
        } => {
            let filter = ItemFilter {
                goal,
                item_type,
                status,
                priority,
                tag,
                search: contains,
            };
            output(&commands::item_list(c, &filter)?, human);
        }
        Commands::Status { id, status } => {
            output(&commands::item_status(c, &id, status)?, human);
        }
        Commands::Priority { id, priority } => {
            output(&commands::item_priority(c, &id, priority)?, human);
        }
        Commands::Update {
            id,
            title,
            goal,
            item_type,
            description,
            priority,
            status,
            link,
            unlink,
        } => {
            let update = ItemUpdate {
                title,
                goal,
                item_type,
                description,
                priority,
                status,
            };
            let links = LinkChanges {
                add: link,
                remove: unlink,
            };
            output(&commands::item_update(c, &id, &update, &links)?, human);
        }
        Commands::Delete { ids } => output(&commands::item_delete(c, &ids)?, human),
        Commands::Merge => output(&commands::merge(c)?, human),
        Commands::Link { command } => match command {
            LinkCommands::Add {
                source,
                target,
                link_type,
            } => output(&commands::link_add(c, &source, &target, link_type)?, human),
            LinkCommands::Rm { source, target } => {
                output(&commands::link_remove(c, &source, &target)?, human);
            }
            LinkCommands::Show { id } => output(&commands::link_show(c, &id)?, human),
            LinkCommands::Tree { id, depth } => {
                output(&commands::link_tree(c, &id, depth)?, human);
            }
            LinkCommands::Suggest { goal, limit } => {
                output(&commands::link_suggest(c, goal.as_deref(), limit)?, human);
            }
        },
        Commands::Tag { command } => match command {
            TagCommands::Add { id, tag } => output(&commands::tag_add(c, &id, &tag)?, human),
            TagCommands::Rm { id, tag } => output(&commands::tag_remove(c, &id, &tag)?, human),
            TagCommands::List { id } => output(&commands::tag_list(c, id.as_deref())?, human),
            TagCommands::Items { tag } => output(&commands::items_by_tag(c, &tag)?, human),
        },
        Commands::Search { query } => {
            output(&commands::search(c, &query.join(" "))?, human);
        }
        Commands::Goals => output(&commands::goals(c)?, human),
        Commands::Export { output: path } => {
            output(&commands::export(c, path.as_deref())?, human);
        }
        Commands::Import { input } => output(&commands::import(c, &input)?, human),
        Commands::Vacuum => output(&commands::vacuum(c)?, human),
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
