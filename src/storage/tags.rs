//! Many-to-many tags on items.
//!
//! Tags are trimmed and lowercased on the way in, so `" Rust "` and `"rust"`
//! name the same tag.

use rusqlite::params;
use tracing::debug;

use super::{ITEM_COLUMNS, ITEM_ORDER, Storage, item_from_row};
use crate::models::WorkItem;
use crate::{Error, Result};

/// Canonical spelling of a tag.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

fn validated(tag: &str) -> Result<String> {
    let tag = normalize_tag(tag);
    if tag.is_empty() {
        return Err(Error::InvalidInput("Tag cannot be empty".to_string()));
    }
    Ok(tag)
}

impl Storage {
    /// Tag an item. Returns `false` when it already carried the tag.
    pub fn add_tag(&mut self, item_id: &str, tag: &str) -> Result<bool> {
        let tag = validated(tag)?;
        if !self.exists(item_id)? {
            return Err(Error::NotFound(format!("Item not found: {}", item_id)));
        }
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag) VALUES (?1, ?2)",
            params![item_id, tag],
        )?;
        if changed > 0 {
            debug!(item = item_id, tag = %tag, "Added tag");
        }
        Ok(changed > 0)
    }

    /// Remove a tag from an item. Returns `false` when it was not there.
    pub fn remove_tag(&mut self, item_id: &str, tag: &str) -> Result<bool> {
        let tag = validated(tag)?;
        let changed = self.conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag = ?2",
            params![item_id, tag],
        )?;
        Ok(changed > 0)
    }

    /// Tags of one item, sorted.
    pub fn tags_for(&self, item_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM item_tags WHERE item_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map([item_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Items carrying `tag`, in listing order.
    pub fn items_by_tag(&self, tag: &str) -> Result<Vec<WorkItem>> {
        let tag = validated(tag)?;
        let sql = format!(
            "SELECT {} FROM work_items w JOIN item_tags t ON t.item_id = w.id
             WHERE t.tag = ?1 {}",
            ITEM_COLUMNS, ITEM_ORDER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([tag], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Every distinct tag, sorted.
    pub fn all_tags(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT tag FROM item_tags ORDER BY tag")?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Every `(item_id, tag)` pair, for export.
    pub fn all_tag_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, tag FROM item_tags ORDER BY item_id, tag")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemType, Priority};

    fn storage_with(ids: &[&str]) -> Storage {
        let mut storage = Storage::open_in_memory().unwrap();
        storage.migrate().unwrap();
        for id in ids {
            let item = WorkItem::new(
                id.to_string(),
                "g".to_string(),
                format!("Item {}", id),
                ItemType::Task,
            );
            storage.add(&item).unwrap();
        }
        storage
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  Rust "), "rust");
        assert!(validated("   ").is_err());
    }

    #[test]
    fn test_add_tag_idempotent() {
        let mut storage = storage_with(&["a"]);
        assert!(storage.add_tag("a", "Rust").unwrap());
        assert!(!storage.add_tag("a", " rust ").unwrap());
        assert_eq!(storage.tags_for("a").unwrap(), vec!["rust"]);
    }

    #[test]
    fn test_add_tag_unknown_item() {
        let mut storage = storage_with(&[]);
        assert!(matches!(
            storage.add_tag("ghost", "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_tag_rejected() {
        let mut storage = storage_with(&["a"]);
        assert!(matches!(
            storage.add_tag("a", "  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_remove_tag() {
        let mut storage = storage_with(&["a"]);
        storage.add_tag("a", "x").unwrap();
        assert!(storage.remove_tag("a", "X").unwrap());
        assert!(!storage.remove_tag("a", "x").unwrap());
        assert!(storage.tags_for("a").unwrap().is_empty());
    }

    #[test]
    fn test_items_by_tag_ordered_like_list() {
        let mut storage = storage_with(&["a", "c"]);
        let mut hi = WorkItem::new("b".into(), "g".into(), "Urgent".into(), ItemType::Task);
        hi.priority = Priority::Hi;
        storage.add(&hi).unwrap();
        for id in ["a", "b", "c"] {
            storage.add_tag(id, "shared").unwrap();
        }
        storage.add_tag("c", "solo").unwrap();

        let ids: Vec<String> = storage
            .items_by_tag("SHARED")
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids[0], "b");
        assert_eq!(ids.len(), 3);
        assert_eq!(storage.all_tags().unwrap(), vec!["shared", "solo"]);
    }

    #[test]
    fn test_tags_survive_item_deletion() {
        let mut storage = storage_with(&["a"]);
        storage.add_tag("a", "kept").unwrap();
        storage.delete("a").unwrap();
        assert_eq!(storage.tags_for("a").unwrap(), vec!["kept"]);
        assert!(storage.items_by_tag("kept").unwrap().is_empty());
    }
}
