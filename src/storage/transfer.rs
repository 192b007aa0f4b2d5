//! Row-level JSON export and import.
//!
//! A [`Snapshot`] carries every row of the data tables with the same column
//! contracts as the entity store. It is not a file copy of the database.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::Storage;
use crate::models::{Link, WorkItem, now};
use crate::storage::codec::encode_time;
use crate::Result;

/// One tag assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub item_id: String,
    pub tag: String,
}

/// Full contents of a logbook database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub exported_at: DateTime<Utc>,
    pub items: Vec<WorkItem>,
    #[serde(default)]
    pub entry_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub tags: Vec<TagRow>,
}

/// What an import wrote. Rows that already existed are counted as skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub items: usize,
    pub skipped_items: usize,
    pub links: usize,
    pub tags: usize,
}

impl Storage {
    /// Capture every row. The WAL is checkpointed first.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        self.checkpoint()?;

        let mut items: Vec<WorkItem> = self.all_items()?.into_values().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let tags = self
            .all_tag_pairs()?
            .into_iter()
            .map(|(item_id, tag)| TagRow { item_id, tag })
            .collect();

        Ok(Snapshot {
            exported_at: now(),
            items,
            entry_counts: self.entry_counts()?.into_iter().collect(),
            links: self.all_links()?,
            tags,
        })
    }

    /// Load a snapshot in one transaction. Items whose id already exists are
    /// skipped; links and tags are inserted when not already present. Entry
    /// counts only ever move forward.
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let tx = self.conn.savepoint()?;

        for item in &snapshot.items {
            let changed = tx.execute(
                r#"
                INSERT OR IGNORE INTO work_items
                (id, title, goal, item_type, description, priority, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    item.id,
                    item.title,
                    item.goal,
                    item.item_type,
                    item.description,
                    item.priority,
                    item.status,
                    encode_time(&item.created_at),
                    encode_time(&item.updated_at),
                ],
            )?;
            if changed > 0 {
                report.items += 1;
            } else {
                report.skipped_items += 1;
            }
        }

        for link in &snapshot.links {
            report.links += tx.execute(
                r#"
                INSERT OR IGNORE INTO item_links (source_id, target_id, link_type, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    link.source_id,
                    link.target_id,
                    link.link_type,
                    encode_time(&link.created_at)
                ],
            )?;
        }

        for row in &snapshot.tags {
            report.tags += tx.execute(
                "INSERT OR IGNORE INTO item_tags (item_id, tag) VALUES (?1, ?2)",
                params![row.item_id, super::tags::normalize_tag(&row.tag)],
            )?;
        }

        for (goal, count) in &snapshot.entry_counts {
            tx.execute(
                r#"
                INSERT INTO goal_entry_count (goal, count) VALUES (?1, ?2)
                ON CONFLICT(goal) DO UPDATE SET count = MAX(count, excluded.count)
                "#,
                params![goal, count],
            )?;
        }

        tx.commit()?;
        info!(
            items = report.items,
            skipped = report.skipped_items,
            links = report.links,
            tags = report.tags,
            "Imported snapshot"
        );
        Ok(report)
    }
}
