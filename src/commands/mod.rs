//! Command implementations for the Logbook CLI.
//!
//! Each command takes the [`Coordinator`] (or the resolved config) and returns
//! a result struct implementing [`Output`], which `main` prints as JSON or as
//! human-readable text.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::Result;
use crate::config::ResolvedConfig;
use crate::coordinator::{Coordinator, LinkSuggestion, MergedPair};
use crate::models::graph::LinkTreeNode;
use crate::models::{
    ItemFilter, ItemLinks, ItemStatus, ItemType, ItemUpdate, LinkChanges, LinkEntry, LinkType,
    NewItem, Priority, WorkItem,
};
use crate::storage::{ImportReport, LedgerEntry, MigrationReport, Snapshot};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

fn item_line(item: &WorkItem) -> String {
    format!(
        "[{}] {} {} ({}, {}, {})",
        item.id,
        status_mark(item.status),
        item.title,
        item.goal,
        item.item_type,
        item.priority
    )
}

fn status_mark(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::NotStarted => "[ ]",
        ItemStatus::InProgress => "[~]",
        ItemStatus::Completed => "[x]",
    }
}

// === Schema ===

#[derive(Serialize)]
pub struct SchemaStatus {
    pub database: String,
    pub migrated: MigrationReport,
    pub ledger: Vec<LedgerEntry>,
}

impl Output for SchemaStatus {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Database: {}", self.database)];
        if self.migrated.is_noop() {
            lines.push(format!("Schema is up to date (v{})", self.migrated.to));
        } else {
            lines.push(format!(
                "Migrated schema v{} -> v{}",
                self.migrated.from, self.migrated.to
            ));
        }
        for entry in &self.ledger {
            lines.push(format!(
                "  v{}  {}  {}",
                entry.version, entry.applied_at, entry.description
            ));
        }
        lines.join("\n")
    }
}

/// Report the schema state after the startup migration.
pub fn schema_status(coordinator: &Coordinator, migrated: MigrationReport) -> Result<SchemaStatus> {
    let storage = coordinator.storage();
    Ok(SchemaStatus {
        database: storage
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string()),
        migrated,
        ledger: storage.ledger()?,
    })
}

// === Items ===

#[derive(Serialize)]
pub struct ItemCreated {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
}

impl Output for ItemCreated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Created {} \"{}\"", self.id, self.title)
    }
}

pub struct AddArgs {
    pub goal: String,
    pub title: String,
    pub item_type: ItemType,
    pub priority: Priority,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Create an item and apply its tags as one unit.
pub fn item_add(coordinator: &mut Coordinator, args: AddArgs) -> Result<ItemCreated> {
    let mut new = NewItem::new(args.goal, args.title, args.item_type).with_priority(args.priority);
    if let Some(description) = args.description {
        new = new.with_description(description);
    }

    coordinator.atomic(|c| {
        let item = c.add_item(new)?;
        for tag in &args.tags {
            c.add_tag(&item.id, tag)?;
        }
        Ok(ItemCreated {
            tags: c.tags_for(&item.id)?,
            id: item.id,
            title: item.title,
        })
    })
}

#[derive(Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: WorkItem,
    pub tags: Vec<String>,
    pub links: ItemLinks,
}

impl Output for ItemDetail {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let item = &self.item;
        let mut lines = vec![
            format!("{} {}", item.id, item.title),
            format!("  Goal: {}", item.goal),
            format!("  Type: {}", item.item_type),
            format!("  Priority: {}", item.priority),
            format!("  Status: {}", item.status),
            format!("  Created: {}", item.created_at.format("%Y-%m-%d %H:%M")),
            format!("  Updated: {}", item.updated_at.format("%Y-%m-%d %H:%M")),
        ];
        if !item.description.is_empty() {
            lines.push(format!("  Description: {}", item.description));
        }
        if !self.tags.is_empty() {
            lines.push(format!("  Tags: {}", self.tags.join(", ")));
        }
        lines.extend(links_human(&self.links));
        lines.join("\n")
    }
}

pub fn item_show(coordinator: &Coordinator, id: &str) -> Result<ItemDetail> {
    Ok(ItemDetail {
        item: coordinator.get_item(id)?.clone(),
        tags: coordinator.tags_for(id)?,
        links: coordinator.get_links(id)?,
    })
}

#[derive(Serialize)]
pub struct ItemList {
    pub items: Vec<WorkItem>,
    pub count: usize,
}

impl ItemList {
    fn new(items: Vec<WorkItem>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

impl Output for ItemList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.items.is_empty() {
            return "No items found.".to_string();
        }
        let mut lines = vec![format!("{} item(s):", self.count)];
        lines.extend(self.items.iter().map(item_line));
        lines.join("\n")
    }
}

pub fn item_list(coordinator: &Coordinator, filter: &ItemFilter) -> Result<ItemList> {
    Ok(ItemList::new(coordinator.list_items(filter)?))
}

pub fn search(coordinator: &Coordinator, query: &str) -> Result<ItemList> {
    Ok(ItemList::new(coordinator.search(query)?))
}

pub fn items_by_tag(coordinator: &Coordinator, tag: &str) -> Result<ItemList> {
    Ok(ItemList::new(coordinator.items_by_tag(tag)?))
}

#[derive(Serialize)]
pub struct ItemUpdated {
    #[serde(flatten)]
    pub item: WorkItem,
}

impl Output for ItemUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Updated {}", item_line(&self.item))
    }
}

pub fn item_status(coordinator: &mut Coordinator, id: &str, status: ItemStatus) -> Result<ItemUpdated> {
    Ok(ItemUpdated {
        item: coordinator.update_status(id, status)?,
    })
}

pub fn item_priority(coordinator: &mut Coordinator, id: &str, priority: Priority) -> Result<ItemUpdated> {
    Ok(ItemUpdated {
        item: coordinator.update_priority(id, priority)?,
    })
}

pub fn item_update(
    coordinator: &mut Coordinator,
    id: &str,
    update: &ItemUpdate,
    links: &LinkChanges,
) -> Result<ItemUpdated> {
    if update.is_empty() && links.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Nothing to update; pass at least one field, --link or --unlink".to_string(),
        ));
    }
    Ok(ItemUpdated {
        item: coordinator.update_item_with_links(id, update, links)?,
    })
}

#[derive(Serialize)]
pub struct ItemsDeleted {
    pub deleted: Vec<String>,
}

impl Output for ItemsDeleted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Deleted {}", self.deleted.join(", "))
    }
}

pub fn item_delete(coordinator: &mut Coordinator, ids: &[String]) -> Result<ItemsDeleted> {
    let deleted = match ids {
        [id] => vec![coordinator.delete_item(id)?],
        _ => coordinator.delete_items(ids)?,
    };
    Ok(ItemsDeleted {
        deleted: deleted.into_iter().map(|item| item.id).collect(),
    })
}

#[derive(Serialize)]
pub struct MergeSummary {
    pub merged: Vec<MergedPair>,
    pub count: usize,
}

impl Output for MergeSummary {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.merged.is_empty() {
            return "No duplicates found.".to_string();
        }
        let mut lines = vec![format!("Merged {} duplicate(s):", self.count)];
        for pair in &self.merged {
            lines.push(format!(
                "  kept {} \"{}\", removed {}",
                pair.kept.id, pair.kept.title, pair.removed.id
            ));
        }
        lines.join("\n")
    }
}

pub fn merge(coordinator: &mut Coordinator) -> Result<MergeSummary> {
    let merged = coordinator.merge_duplicates()?;
    Ok(MergeSummary {
        count: merged.len(),
        merged,
    })
}

#[derive(Serialize)]
pub struct GoalList {
    pub goals: Vec<String>,
}

impl Output for GoalList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.goals.is_empty() {
            return "No goals yet.".to_string();
        }
        self.goals.join("\n")
    }
}

pub fn goals(coordinator: &Coordinator) -> Result<GoalList> {
    Ok(GoalList {
        goals: coordinator.goals()?,
    })
}

// === Links ===

#[derive(Serialize)]
pub struct LinkChanged {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    /// False when the command found nothing to do
    pub changed: bool,
}

impl Output for LinkChanged {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match (self.link_type, self.changed) {
            (Some(ty), true) => format!("Linked {} --[{}]--> {}", self.source, ty, self.target),
            (Some(_), false) => format!("{} is already linked to {}", self.source, self.target),
            (None, true) => format!("Removed link {} --> {}", self.source, self.target),
            (None, false) => format!("No link from {} to {}", self.source, self.target),
        }
    }
}

pub fn link_add(
    coordinator: &mut Coordinator,
    source: &str,
    target: &str,
    link_type: LinkType,
) -> Result<LinkChanged> {
    let changed = coordinator.add_link(source, target, link_type)?;
    Ok(LinkChanged {
        source: source.to_string(),
        target: target.to_string(),
        link_type: Some(link_type),
        changed,
    })
}

pub fn link_remove(coordinator: &mut Coordinator, source: &str, target: &str) -> Result<LinkChanged> {
    let changed = coordinator.remove_link(source, target)?;
    Ok(LinkChanged {
        source: source.to_string(),
        target: target.to_string(),
        link_type: None,
        changed,
    })
}

#[derive(Serialize)]
pub struct LinksShown {
    pub id: String,
    #[serde(flatten)]
    pub links: ItemLinks,
}

impl Output for LinksShown {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let lines = links_human(&self.links);
        if lines.is_empty() {
            return format!("{} has no links.", self.id);
        }
        lines.join("\n")
    }
}

fn links_human(links: &ItemLinks) -> Vec<String> {
    fn entry(arrow: &str, e: &LinkEntry) -> String {
        let title = e.peer.title().unwrap_or("(missing)");
        format!("    {} [{}] {} {}", arrow, e.link_type, e.peer_id, title)
    }

    let mut lines = Vec::new();
    if !links.outgoing.is_empty() {
        lines.push("  Outgoing:".to_string());
        lines.extend(links.outgoing.iter().map(|e| entry("->", e)));
    }
    if !links.incoming.is_empty() {
        lines.push("  Incoming:".to_string());
        lines.extend(links.incoming.iter().map(|e| entry("<-", e)));
    }
    lines
}

pub fn link_show(coordinator: &Coordinator, id: &str) -> Result<LinksShown> {
    Ok(LinksShown {
        id: id.to_string(),
        links: coordinator.get_links(id)?,
    })
}

#[derive(Serialize)]
pub struct LinkTree {
    pub root: LinkTreeNode,
}

impl Output for LinkTree {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![node_label(&self.root)];
        render_children(&self.root, "", &mut lines);
        lines.join("\n")
    }
}

fn node_label(node: &LinkTreeNode) -> String {
    let mut label = match node.link_type {
        Some(ty) => format!("[{}] {}", ty, node.id),
        None => node.id.clone(),
    };
    if let Some(title) = &node.title {
        label.push_str(&format!(" {}", title));
    }
    if node.is_cycle() {
        label.push_str(" (cycle)");
    } else if node.is_missing() {
        label.push_str(" (missing)");
    }
    label
}

fn render_children(node: &LinkTreeNode, prefix: &str, lines: &mut Vec<String>) {
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        lines.push(format!("{}{}{}", prefix, branch, node_label(child)));
        render_children(child, &format!("{}{}", prefix, indent), lines);
    }
}

pub fn link_tree(coordinator: &Coordinator, id: &str, depth: Option<usize>) -> Result<LinkTree> {
    Ok(LinkTree {
        root: coordinator.link_tree(id, depth)?,
    })
}

#[derive(Serialize)]
pub struct Suggestions {
    pub suggestions: Vec<LinkSuggestion>,
}

impl Output for Suggestions {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.suggestions
            .iter()
            .map(|s| {
                let title: String = s.title.chars().take(40).collect();
                format!("{} - {}", s.id, title)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn link_suggest(coordinator: &Coordinator, goal: Option<&str>, limit: usize) -> Result<Suggestions> {
    Ok(Suggestions {
        suggestions: coordinator.suggest_link_targets(goal, limit)?,
    })
}

// === Tags ===

#[derive(Serialize)]
pub struct TagChanged {
    pub id: String,
    pub tag: String,
    pub changed: bool,
}

impl Output for TagChanged {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.changed {
            format!("{}: {}", self.id, self.tag)
        } else {
            format!("{}: no change for tag {}", self.id, self.tag)
        }
    }
}

pub fn tag_add(coordinator: &mut Coordinator, id: &str, tag: &str) -> Result<TagChanged> {
    let changed = coordinator.add_tag(id, tag)?;
    Ok(TagChanged {
        id: id.to_string(),
        tag: crate::storage::tags::normalize_tag(tag),
        changed,
    })
}

pub fn tag_remove(coordinator: &mut Coordinator, id: &str, tag: &str) -> Result<TagChanged> {
    let changed = coordinator.remove_tag(id, tag)?;
    Ok(TagChanged {
        id: id.to_string(),
        tag: crate::storage::tags::normalize_tag(tag),
        changed,
    })
}

#[derive(Serialize)]
pub struct TagList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tags: Vec<String>,
}

impl Output for TagList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tags.is_empty() {
            return "No tags.".to_string();
        }
        self.tags.join("\n")
    }
}

pub fn tag_list(coordinator: &Coordinator, id: Option<&str>) -> Result<TagList> {
    let tags = match id {
        Some(id) => {
            coordinator.get_item(id)?;
            coordinator.tags_for(id)?
        }
        None => coordinator.all_tags()?,
    };
    Ok(TagList {
        id: id.map(str::to_string),
        tags,
    })
}

// === Transfer & maintenance ===

#[derive(Serialize)]
pub struct Exported {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub items: usize,
    pub links: usize,
    pub tags: usize,
    #[serde(skip)]
    pub snapshot: Option<Snapshot>,
}

impl Output for Exported {
    fn to_json(&self) -> String {
        match &self.snapshot {
            Some(snapshot) => json(snapshot),
            None => json(self),
        }
    }

    fn to_human(&self) -> String {
        match (&self.snapshot, &self.path) {
            (Some(snapshot), _) => json(snapshot),
            (None, Some(path)) => format!(
                "Exported {} items, {} links, {} tags to {}",
                self.items, self.links, self.tags, path
            ),
            (None, None) => String::new(),
        }
    }
}

/// Export to `output`, or return the snapshot itself for printing.
pub fn export(coordinator: &Coordinator, output: Option<&Path>) -> Result<Exported> {
    let snapshot = coordinator.export_snapshot()?;
    let (items, links, tags) = (snapshot.items.len(), snapshot.links.len(), snapshot.tags.len());

    match output {
        Some(path) => {
            let content = serde_json::to_string_pretty(&snapshot)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
            Ok(Exported {
                path: Some(path.display().to_string()),
                items,
                links,
                tags,
                snapshot: None,
            })
        }
        None => Ok(Exported {
            path: None,
            items,
            links,
            tags,
            snapshot: Some(snapshot),
        }),
    }
}

#[derive(Serialize)]
pub struct Imported {
    #[serde(flatten)]
    pub report: ImportReport,
}

impl Output for Imported {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let r = &self.report;
        format!(
            "Imported {} items ({} already present), {} links, {} tags",
            r.items, r.skipped_items, r.links, r.tags
        )
    }
}

pub fn import(coordinator: &mut Coordinator, input: &Path) -> Result<Imported> {
    let content = fs::read_to_string(input)?;
    let snapshot: Snapshot = serde_json::from_str(&content)?;
    Ok(Imported {
        report: coordinator.import_snapshot(&snapshot)?,
    })
}

#[derive(Serialize)]
pub struct Vacuumed {
    pub vacuumed: bool,
}

impl Output for Vacuumed {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        "Database vacuumed.".to_string()
    }
}

pub fn vacuum(coordinator: &mut Coordinator) -> Result<Vacuumed> {
    coordinator.optimize()?;
    Ok(Vacuumed { vacuumed: true })
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

#[derive(Serialize)]
pub struct ConfigShown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShown {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(path) = &self.config_file {
            lines.push(format!("Config file: {}", path));
        }
        for entry in &self.settings {
            lines.push(format!("{} = {}  ({})", entry.key, entry.value, entry.source));
        }
        lines.join("\n")
    }
}

pub fn config_show(config: &ResolvedConfig) -> ConfigShown {
    let entry = |key, value: String, source: &crate::config::ValueSource| ConfigEntry {
        key,
        value,
        source: source.to_string(),
    };
    ConfigShown {
        config_file: config.config_path.as_ref().map(|p| p.display().to_string()),
        settings: vec![
            entry(
                "database",
                config.database().display().to_string(),
                &config.database.source,
            ),
            entry(
                "output-format",
                config.output_format().to_string(),
                &config.output_format.source,
            ),
            entry(
                "default-priority",
                config.default_priority().to_string(),
                &config.default_priority.source,
            ),
            entry(
                "log-level",
                config.log_level().to_string(),
                &config.log_level.source,
            ),
            entry(
                "pool-size",
                config.pool_size().to_string(),
                &config.pool_size.source,
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    fn add(c: &mut Coordinator, goal: &str, title: &str) -> String {
        item_add(
            c,
            AddArgs {
                goal: goal.to_string(),
                title: title.to_string(),
                item_type: ItemType::Task,
                priority: Priority::Med,
                description: None,
                tags: Vec::new(),
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_item_add_with_tags_is_atomic() {
        let env = TestEnv::new();
        let mut c = env.coordinator();

        let created = item_add(
            &mut c,
            AddArgs {
                goal: "Proj".to_string(),
                title: "Tagged".to_string(),
                item_type: ItemType::Learning,
                priority: Priority::Hi,
                description: Some("desc".to_string()),
                tags: vec!["Rust".to_string(), "db".to_string()],
            },
        )
        .unwrap();
        assert_eq!(created.tags, vec!["db", "rust"]);
        assert!(created.id.starts_with("pl31"));

        let err = item_add(
            &mut c,
            AddArgs {
                goal: "Proj".to_string(),
                title: "Bad tag".to_string(),
                item_type: ItemType::Task,
                priority: Priority::Med,
                description: None,
                tags: vec!["  ".to_string()],
            },
        );
        assert!(err.is_err());
        assert_eq!(c.items().len(), 1);
        assert_eq!(c.storage().count().unwrap(), 1);
    }

    #[test]
    fn test_item_show_json_flattens_item() {
        let env = TestEnv::new();
        let mut c = env.coordinator();
        let id = add(&mut c, "g", "Shown");
        let detail = item_show(&c, &id).unwrap();
        let value: serde_json::Value = serde_json::from_str(&detail.to_json()).unwrap();
        assert_eq!(value["id"], id.as_str());
        assert_eq!(value["priority"], "med");
        assert!(value["links"]["outgoing"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_link_tree_human_rendering() {
        let env = TestEnv::new();
        let mut c = env.coordinator();
        let a = add(&mut c, "g", "A");
        let b = add(&mut c, "g", "B");
        link_add(&mut c, &a, &b, LinkType::References).unwrap();
        link_add(&mut c, &b, &a, LinkType::InspiredBy).unwrap();

        let human = link_tree(&c, &a, None).unwrap().to_human();
        let lines: Vec<&str> = human.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("{} A", a));
        assert_eq!(lines[1], format!("└── [references] {} B", b));
        assert_eq!(lines[2], format!("    └── [inspired-by] {} A (cycle)", a));
    }

    #[test]
    fn test_item_update_requires_changes() {
        let env = TestEnv::new();
        let mut c = env.coordinator();
        let id = add(&mut c, "g", "A");
        let result = item_update(&mut c, &id, &ItemUpdate::default(), &LinkChanges::new());
        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
    }

    #[test]
    fn test_export_to_file_and_import() {
        let env = TestEnv::new();
        let mut c = env.coordinator();
        add(&mut c, "g", "A");
        let path = env.data_path().join("out").join("snapshot.json");

        let exported = export(&c, Some(&path)).unwrap();
        assert_eq!(exported.items, 1);
        assert!(path.exists());

        let other = TestEnv::new();
        let mut target = other.coordinator();
        let imported = import(&mut target, &path).unwrap();
        assert_eq!(imported.report.items, 1);
        assert_eq!(target.items().len(), 1);
    }

    #[test]
    fn test_tag_list_unknown_item() {
        let env = TestEnv::new();
        let c = env.coordinator();
        assert!(matches!(
            tag_list(&c, Some("ghost")),
            Err(crate::Error::NotFound(_))
        ));
        assert!(tag_list(&c, None).unwrap().tags.is_empty());
    }
}
