//! Link graph traversal.
//!
//! [`LinkGraph`] turns a flat edge list into a tree rooted at one item. The walk
//! is a depth-first search over outgoing edges that keeps an *open-path set*:
//! the ids on the current DFS stack. Re-entering an id from that set is a true
//! cycle and is cut with a [`NodeMarker::Cycle`] leaf. An id reached through two
//! independent branches (a diamond) is not on the open path the second time, so
//! it is expanded again under each branch rather than deduplicated globally.
//!
//! Edges whose target no longer resolves to an item produce a
//! [`NodeMarker::Missing`] leaf at every place they are referenced.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::{Link, LinkType};

/// An outgoing edge in adjacency form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutEdge {
    pub link_type: LinkType,
    pub target_id: String,
}

/// Why a tree node has no children even though it may have outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMarker {
    /// The id is already an ancestor on the current path
    Cycle,
    /// The id does not name an existing item
    Missing,
}

/// One occurrence of an item in a traversal tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkTreeNode {
    pub id: String,

    /// Title of the item; `None` when the item is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Type of the edge that led here; `None` for the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,

    /// Distance from the root (root is 0)
    pub depth: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<NodeMarker>,

    pub children: Vec<LinkTreeNode>,
}

impl LinkTreeNode {
    pub fn is_cycle(&self) -> bool {
        self.marker == Some(NodeMarker::Cycle)
    }

    pub fn is_missing(&self) -> bool {
        self.marker == Some(NodeMarker::Missing)
    }

    /// All nodes in pre-order, root first.
    pub fn walk(&self) -> Vec<&LinkTreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Every occurrence of `id` in the tree, in pre-order.
    pub fn occurrences(&self, id: &str) -> Vec<&LinkTreeNode> {
        self.walk().into_iter().filter(|n| n.id == id).collect()
    }
}

/// Adjacency view over a set of links.
///
/// Outgoing edges are kept sorted by `(link_type, target_id)` so every walk over
/// the same edge set yields the same tree.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    outgoing: HashMap<String, Vec<OutEdge>>,
}

impl LinkGraph {
    pub fn new<'a>(links: impl IntoIterator<Item = &'a Link>) -> Self {
        let mut outgoing: HashMap<String, Vec<OutEdge>> = HashMap::new();
        for link in links {
            outgoing
                .entry(link.source_id.clone())
                .or_default()
                .push(OutEdge {
                    link_type: link.link_type,
                    target_id: link.target_id.clone(),
                });
        }
        for edges in outgoing.values_mut() {
            edges.sort_by(|a, b| {
                (a.link_type.as_str(), a.target_id.as_str())
                    .cmp(&(b.link_type.as_str(), b.target_id.as_str()))
            });
        }
        Self { outgoing }
    }

    /// Outgoing edges of `id` in traversal order.
    pub fn outgoing(&self, id: &str) -> &[OutEdge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct sources with at least one outgoing edge.
    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    /// Build the traversal tree rooted at `root`.
    ///
    /// `lookup` resolves an id to its current title, returning `None` when the
    /// item does not exist. Nodes at `max_depth` are kept but not expanded;
    /// `None` walks until every branch ends in a leaf, a cycle or a missing item.
    pub fn tree<F>(&self, root: &str, max_depth: Option<usize>, lookup: F) -> LinkTreeNode
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut open_path = HashSet::new();
        self.visit(root, None, 0, max_depth, &mut open_path, &lookup)
    }

    fn visit<F>(
        &self,
        id: &str,
        link_type: Option<LinkType>,
        depth: usize,
        max_depth: Option<usize>,
        open_path: &mut HashSet<String>,
        lookup: &F,
    ) -> LinkTreeNode
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut node = LinkTreeNode {
            id: id.to_string(),
            title: lookup(id),
            link_type,
            depth,
            marker: None,
            children: Vec::new(),
        };

        if node.title.is_none() {
            node.marker = Some(NodeMarker::Missing);
            return node;
        }
        if open_path.contains(id) {
            node.marker = Some(NodeMarker::Cycle);
            return node;
        }
        if max_depth.is_some_and(|max| depth >= max) {
            return node;
        }

        open_path.insert(id.to_string());
        node.children = self
            .outgoing(id)
            .iter()
            .map(|edge| {
                self.visit(
                    &edge.target_id,
                    Some(edge.link_type),
                    depth + 1,
                    max_depth,
                    open_path,
                    lookup,
                )
            })
            .collect();
        open_path.remove(id);

        node
    }
}
