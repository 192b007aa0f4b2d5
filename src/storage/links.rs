//! Directed links between items.
//!
//! At most one link exists per ordered `(source, target)` pair. Links are not
//! removed when an item is deleted; queries report such peers as
//! [`LinkPeer::Missing`].

use rusqlite::params;
use tracing::debug;

use super::Storage;
use crate::models::{ItemLinks, Link, LinkEntry, LinkPeer, LinkType};
use crate::storage::codec::{decode_time, encode_time};
use crate::{Error, Result};

impl Storage {
    /// Create a link. Both endpoints must exist.
    ///
    /// Returns `false` without writing when the ordered pair is already linked,
    /// whatever the existing link's type.
    pub fn add_link(&mut self, source_id: &str, target_id: &str, link_type: LinkType) -> Result<bool> {
        for id in [source_id, target_id] {
            if !self.exists(id)? {
                return Err(Error::NotFound(format!("Item not found: {}", id)));
            }
        }
        let link = Link::new(source_id.to_string(), target_id.to_string(), link_type);
        self.insert_link(&link)
    }

    /// Insert a link row as-is, without checking the endpoints.
    pub(crate) fn insert_link(&mut self, link: &Link) -> Result<bool> {
        let changed = self.conn.execute(
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
        if changed > 0 {
            debug!(
                source = %link.source_id,
                target = %link.target_id,
                link_type = %link.link_type,
                "Added link"
            );
        }
        Ok(changed > 0)
    }

    /// Remove the link from `source_id` to `target_id`. Returns `false` when there was none.
    pub fn remove_link(&mut self, source_id: &str, target_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM item_links WHERE source_id = ?1 AND target_id = ?2",
            params![source_id, target_id],
        )?;
        if changed > 0 {
            debug!(source = source_id, target = target_id, "Removed link");
        }
        Ok(changed > 0)
    }

    /// The link between an ordered pair, if any.
    pub fn find_link(&self, source_id: &str, target_id: &str) -> Result<Option<Link>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, link_type, created_at FROM item_links
             WHERE source_id = ?1 AND target_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![source_id, target_id], link_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Outgoing and incoming links of `id`, with peer titles resolved now.
    pub fn get_links(&self, id: &str) -> Result<ItemLinks> {
        Ok(ItemLinks {
            outgoing: self.link_entries(id, "source_id", "target_id")?,
            incoming: self.link_entries(id, "target_id", "source_id")?,
        })
    }

    fn link_entries(&self, id: &str, own_col: &str, peer_col: &str) -> Result<Vec<LinkEntry>> {
        let sql = format!(
            "SELECT l.{peer}, l.link_type, l.created_at, w.title
             FROM item_links l LEFT JOIN work_items w ON w.id = l.{peer}
             WHERE l.{own} = ?1
             ORDER BY l.link_type, l.{peer}",
            own = own_col,
            peer = peer_col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([id], |row| {
                let created_at: String = row.get(2)?;
                let title: Option<String> = row.get(3)?;
                Ok(LinkEntry {
                    peer_id: row.get(0)?,
                    link_type: row.get(1)?,
                    created_at: decode_time(&created_at, 2)?,
                    peer: match title {
                        Some(title) => LinkPeer::Present { title },
                        None => LinkPeer::Missing,
                    },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Every link, ordered by source then target.
    pub fn all_links(&self) -> Result<Vec<Link>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, link_type, created_at FROM item_links
             ORDER BY source_id, target_id",
        )?;
        let links = stmt
            .query_map([], link_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }
}

fn link_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Link> {
    let created_at: String = row.get(3)?;
    Ok(Link {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        link_type: row.get(2)?,
        created_at: decode_time(&created_at, 3)?,
    })
}
