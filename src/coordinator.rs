//! Coordinator: the entry point for every item, link and tag mutation.
//!
//! The coordinator owns a [`Storage`] handed to it by the caller and keeps two
//! mirrors of durable state in memory: items by id and the per-goal id
//! sequence. Every mutation writes to storage first and touches the mirrors
//! only once the write succeeded.
//!
//! Multi-step operations run inside [`Coordinator::atomic`]: storage writes
//! are wrapped in a savepoint and the mirrors are snapshotted, so a failure at
//! any step leaves both exactly as they were.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::models::graph::{LinkGraph, LinkTreeNode};
use crate::models::{
    DedupKey, ItemFilter, ItemLinks, ItemStatus, ItemType, ItemUpdate, LinkChanges, LinkType,
    NewItem, Priority, WorkItem,
};
use crate::storage::{ImportReport, Snapshot, Storage};
use crate::{Error, Result};

/// Build an item id: goal initial, type initial, priority number, per-goal
/// sequence, then the 12-hour clock time without a leading zero.
///
/// `("Proj", Task, Hi, 1, 12:30 PM)` gives `"pt311230pm"`. Two items for the
/// same goal created in the same minute can only collide if the sequence
/// repeats, and a collision is reported by the store as `DuplicateId`.
pub fn format_item_id(
    goal: &str,
    item_type: ItemType,
    priority: Priority,
    sequence: u32,
    at: DateTime<Local>,
) -> String {
    let goal_initial: String = goal
        .trim()
        .chars()
        .next()
        .map(|c| c.to_lowercase().collect())
        .unwrap_or_default();
    format!(
        "{}{}{}{}{}",
        goal_initial,
        item_type.initial(),
        priority.number(),
        sequence,
        at.format("%-I%M%P")
    )
}

/// A candidate target for a new link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSuggestion {
    pub id: String,
    pub title: String,
}

/// A `(kept, removed)` pair reported by [`Coordinator::merge_duplicates`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedPair {
    pub kept: WorkItem,
    pub removed: WorkItem,
}

pub struct Coordinator {
    storage: Storage,
    items: HashMap<String, WorkItem>,
    entry_counts: HashMap<String, u32>,
}

impl Coordinator {
    /// Load the mirrors from an already migrated storage.
    pub fn new(storage: Storage) -> Result<Self> {
        let items = storage.all_items()?;
        let entry_counts = storage.entry_counts()?;
        debug!(items = items.len(), goals = entry_counts.len(), "Loaded coordinator");
        Ok(Self {
            storage,
            items,
            entry_counts,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn into_storage(self) -> Storage {
        self.storage
    }

    /// Run `f` as one unit. On error, storage writes made by `f` are rolled
    /// back, both mirrors are restored, and the error is returned unchanged.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let items = self.items.clone();
        let entry_counts = self.entry_counts.clone();

        self.storage.begin_scope()?;
        let result = f(self).and_then(|value| {
            self.storage.commit_scope()?;
            Ok(value)
        });

        if let Err(e) = &result {
            warn!(error = %e, "Rolling back atomic operation");
            if let Err(rollback) = self.storage.rollback_scope() {
                warn!(error = %rollback, "Savepoint rollback failed");
            }
            self.items = items;
            self.entry_counts = entry_counts;
        }
        result
    }

    // === Items ===

    /// Create an item with a generated id.
    ///
    /// Fails with `Duplicate` when an item with the same normalized title,
    /// type and priority exists; nothing is written in that case.
    pub fn add_item(&mut self, new: NewItem) -> Result<WorkItem> {
        let title = new.title.trim();
        let goal = new.goal.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }
        if goal.is_empty() {
            return Err(Error::InvalidInput("Goal cannot be empty".to_string()));
        }
        if let Some(existing) = self.find_duplicate(title, new.item_type, new.priority) {
            return Err(Error::Duplicate {
                existing_id: existing.id.clone(),
                title: existing.title.clone(),
            });
        }

        let mut item = WorkItem::new(String::new(), goal.to_string(), title.to_string(), new.item_type);
        item.description = new.description;
        item.priority = new.priority;

        self.atomic(|this| {
            item.id = this.next_id(&item.goal, item.item_type, item.priority)?;
            this.storage.add(&item)?;
            this.items.insert(item.id.clone(), item.clone());
            debug!(id = %item.id, goal = %item.goal, "Added item");
            Ok(item)
        })
    }

    fn next_id(&mut self, goal: &str, item_type: ItemType, priority: Priority) -> Result<String> {
        let sequence = self.entry_counts.get(goal).copied().unwrap_or(0) + 1;
        self.storage.set_entry_count(goal, sequence)?;
        self.entry_counts.insert(goal.to_string(), sequence);
        Ok(format_item_id(goal, item_type, priority, sequence, Local::now()))
    }

    pub fn get_item(&self, id: &str) -> Result<&WorkItem> {
        self.items
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Item not found: {}", id)))
    }

    /// Every mirrored item, keyed by id.
    pub fn items(&self) -> &HashMap<String, WorkItem> {
        &self.items
    }

    pub fn update_status(&mut self, id: &str, status: ItemStatus) -> Result<WorkItem> {
        self.update_item(
            id,
            &ItemUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    pub fn update_priority(&mut self, id: &str, priority: Priority) -> Result<WorkItem> {
        self.update_item(
            id,
            &ItemUpdate {
                priority: Some(priority),
                ..Default::default()
            },
        )
    }

    /// Apply a partial update. The duplicate check is not repeated here.
    pub fn update_item(&mut self, id: &str, update: &ItemUpdate) -> Result<WorkItem> {
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }
        if update.goal.as_deref().is_some_and(|g| g.trim().is_empty()) {
            return Err(Error::InvalidInput("Goal cannot be empty".to_string()));
        }

        let mut item = self.get_item(id)?.clone();
        update.apply(&mut item);
        self.storage.update(&item)?;
        self.items.insert(item.id.clone(), item.clone());
        debug!(id, "Updated item");
        Ok(item)
    }

    /// Update fields and edit outgoing links in one atomic step.
    pub fn update_item_with_links(
        &mut self,
        id: &str,
        update: &ItemUpdate,
        links: &LinkChanges,
    ) -> Result<WorkItem> {
        self.atomic(|this| {
            let item = if update.is_empty() {
                this.get_item(id)?.clone()
            } else {
                this.update_item(id, update)?
            };
            this.apply_link_changes(id, links)?;
            Ok(item)
        })
    }

    /// Apply link removals then additions from `source_id` as one unit.
    ///
    /// Removing a link that does not exist, or linking to an unknown item,
    /// aborts the whole batch. Adding a pair that is already linked is a no-op.
    pub fn batch_update_links(&mut self, source_id: &str, links: &LinkChanges) -> Result<()> {
        self.atomic(|this| this.apply_link_changes(source_id, links))
    }

    fn apply_link_changes(&mut self, source_id: &str, links: &LinkChanges) -> Result<()> {
        for target in &links.remove {
            if !self.storage.remove_link(source_id, target)? {
                return Err(Error::NotFound(format!(
                    "Link not found: {} -> {}",
                    source_id, target
                )));
            }
        }
        for (target, link_type) in &links.add {
            self.storage.add_link(source_id, target, *link_type)?;
        }
        Ok(())
    }

    /// Delete an item. Its links and tags stay behind as dangling references.
    pub fn delete_item(&mut self, id: &str) -> Result<WorkItem> {
        self.get_item(id)?;
        self.storage.delete(id)?;
        let removed = self
            .items
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Item not found: {}", id)))?;
        debug!(id, "Deleted item");
        Ok(removed)
    }

    /// Delete several items; all or none.
    pub fn delete_items(&mut self, ids: &[String]) -> Result<Vec<WorkItem>> {
        self.atomic(|this| {
            this.storage.delete_many(ids)?;
            ids.iter()
                .map(|id| {
                    this.items
                        .remove(id)
                        .ok_or_else(|| Error::NotFound(format!("Item not found: {}", id)))
                })
                .collect()
        })
    }

    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        self.storage.list(filter)
    }

    pub fn goals(&self) -> Result<Vec<String>> {
        self.storage.goals()
    }

    // === Duplicates ===

    /// The item sharing this dedup key, preferring the oldest.
    pub fn find_duplicate(
        &self,
        title: &str,
        item_type: ItemType,
        priority: Priority,
    ) -> Option<&WorkItem> {
        let key = DedupKey::new(title, item_type, priority);
        self.items
            .values()
            .filter(|item| item.dedup_key() == key)
            .min_by(|a, b| keep_order(a, b))
    }

    /// Collapse items that share a dedup key, keeping the oldest of each group.
    ///
    /// Returns one pair per removed item, sorted by kept id then removed id.
    pub fn merge_duplicates(&mut self) -> Result<Vec<MergedPair>> {
        let mut groups: HashMap<DedupKey, Vec<&WorkItem>> = HashMap::new();
        for item in self.items.values() {
            groups.entry(item.dedup_key()).or_default().push(item);
        }

        let mut pairs = Vec::new();
        for mut group in groups.into_values().filter(|g| g.len() > 1) {
            group.sort_by(|a, b| keep_order(a, b));
            let kept = group[0];
            for removed in &group[1..] {
                pairs.push(MergedPair {
                    kept: kept.clone(),
                    removed: (*removed).clone(),
                });
            }
        }
        pairs.sort_by(|a, b| {
            a.kept
                .id
                .cmp(&b.kept.id)
                .then_with(|| a.removed.id.cmp(&b.removed.id))
        });

        if pairs.is_empty() {
            return Ok(pairs);
        }

        let ids: Vec<String> = pairs.iter().map(|p| p.removed.id.clone()).collect();
        self.delete_items(&ids)?;
        info!(removed = ids.len(), "Merged duplicate items");
        Ok(pairs)
    }

    // === Links ===

    pub fn add_link(&mut self, source_id: &str, target_id: &str, link_type: LinkType) -> Result<bool> {
        self.storage.add_link(source_id, target_id, link_type)
    }

    pub fn remove_link(&mut self, source_id: &str, target_id: &str) -> Result<bool> {
        self.storage.remove_link(source_id, target_id)
    }

    pub fn get_links(&self, id: &str) -> Result<ItemLinks> {
        self.get_item(id)?;
        self.storage.get_links(id)
    }

    /// Traversal tree of outgoing links from `root`. See [`LinkGraph::tree`].
    pub fn link_tree(&self, root: &str, max_depth: Option<usize>) -> Result<LinkTreeNode> {
        self.get_item(root)?;
        let links = self.storage.all_links()?;
        let graph = LinkGraph::new(&links);
        Ok(graph.tree(root, max_depth, |id| {
            self.items.get(id).map(|item| item.title.clone())
        }))
    }

    /// Recently touched items to offer as link targets.
    ///
    /// With a goal, items of that goal in listing order; otherwise every item
    /// by most recent update.
    pub fn suggest_link_targets(&self, goal: Option<&str>, limit: usize) -> Result<Vec<LinkSuggestion>> {
        let items = match goal {
            Some(goal) => self.list_items(&ItemFilter::new().goal(goal))?,
            None => {
                let mut items: Vec<WorkItem> = self.items.values().cloned().collect();
                items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
                items
            }
        };
        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| LinkSuggestion {
                id: item.id,
                title: item.title,
            })
            .collect())
    }

    // === Tags ===

    pub fn add_tag(&mut self, item_id: &str, tag: &str) -> Result<bool> {
        self.storage.add_tag(item_id, tag)
    }

    pub fn remove_tag(&mut self, item_id: &str, tag: &str) -> Result<bool> {
        self.storage.remove_tag(item_id, tag)
    }

    pub fn tags_for(&self, item_id: &str) -> Result<Vec<String>> {
        self.storage.tags_for(item_id)
    }

    pub fn items_by_tag(&self, tag: &str) -> Result<Vec<WorkItem>> {
        self.storage.items_by_tag(tag)
    }

    pub fn all_tags(&self) -> Result<Vec<String>> {
        self.storage.all_tags()
    }

    // === Search & maintenance ===

    pub fn search(&self, query: &str) -> Result<Vec<WorkItem>> {
        self.storage.search(query)
    }

    /// Reclaim free space in the database file.
    pub fn optimize(&mut self) -> Result<()> {
        self.storage.vacuum()
    }

    pub fn export_snapshot(&self) -> Result<Snapshot> {
        self.storage.export_snapshot()
    }

    /// Import a snapshot and reload both mirrors from storage.
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<ImportReport> {
        self.atomic(|this| {
            let report = this.storage.import_snapshot(snapshot)?;
            this.items = this.storage.all_items()?;
            this.entry_counts = this.storage.entry_counts()?;
            Ok(report)
        })
    }
}

/// Merge keeps the earliest item; ties go to the smaller id.
fn keep_order(a: &WorkItem, b: &WorkItem) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
