//! Data models for Logbook entities.
//!
//! This module defines the core data structures:
//! - `WorkItem` - Tasks, learning goals, research notes and thoughts
//! - `Link` - Typed, directed relationships between items
//! - `ItemLinks` - Outgoing and incoming links of one item, with peer titles
//! - `ItemFilter` / `ItemUpdate` - Query and mutation descriptors
//!
//! Every enum has exactly one string spelling, shared by `Display`, `FromStr`,
//! serde and the SQLite codec in [`crate::storage`].

pub mod graph;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Current UTC time truncated to microseconds, the precision items are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Kind of work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Task,
    Learning,
    Research,
    Thought,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Task => "task",
            ItemType::Learning => "learning",
            ItemType::Research => "research",
            ItemType::Thought => "thought",
        }
    }

    /// Initial used in generated ids. Thoughts use two letters so they never
    /// collide with tasks.
    pub fn initial(&self) -> &'static str {
        match self {
            ItemType::Task => "t",
            ItemType::Learning => "l",
            ItemType::Research => "r",
            ItemType::Thought => "th",
        }
    }

    pub fn all() -> &'static [ItemType] {
        &[
            ItemType::Task,
            ItemType::Learning,
            ItemType::Research,
            ItemType::Thought,
        ]
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    /// Accepts full names and the legacy single-letter codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" | "t" => Ok(ItemType::Task),
            "learning" | "learn" | "l" => Ok(ItemType::Learning),
            "research" | "r" => Ok(ItemType::Research),
            "thought" | "th" => Ok(ItemType::Thought),
            _ => Err(Error::InvalidInput(format!("Invalid item type: {}", s))),
        }
    }
}

/// Item priority. Ordered `Low < Med < Hi`; persisted as 1, 2, 3.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Med,
    Hi,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Med => "med",
            Priority::Hi => "hi",
        }
    }

    /// Numeric code stored in the database and embedded in ids.
    pub fn number(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Med => 2,
            Priority::Hi => 3,
        }
    }

    pub fn from_number(n: i64) -> Result<Self, Error> {
        match n {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Med),
            3 => Ok(Priority::Hi),
            _ => Err(Error::InvalidInput(format!("Invalid priority: {}", n))),
        }
    }

    pub fn all() -> &'static [Priority] {
        &[Priority::Low, Priority::Med, Priority::Hi]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "med" | "medium" | "2" => Ok(Priority::Med),
            "hi" | "high" | "3" => Ok(Priority::Hi),
            _ => Err(Error::InvalidInput(format!("Invalid priority: {}", s))),
        }
    }
}

/// Progress of a work item. Any status may follow any other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::NotStarted => "not_started",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "not_started" | "not-started" | "notstarted" => Ok(ItemStatus::NotStarted),
            "in_progress" | "in-progress" | "inprogress" => Ok(ItemStatus::InProgress),
            "completed" | "done" => Ok(ItemStatus::Completed),
            _ => Err(Error::InvalidInput(format!("Invalid status: {}", s))),
        }
    }
}

/// A unit of user-authored work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Generated identifier (e.g., "pt311230pm")
    pub id: String,

    pub title: String,

    /// Free-text namespace grouping related items
    pub goal: String,

    pub item_type: ItemType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: ItemStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a new item with default priority and status.
    pub fn new(id: String, goal: String, title: String, item_type: ItemType) -> Self {
        let now = now();
        Self {
            id,
            title,
            goal,
            item_type,
            description: String::new(),
            priority: Priority::default(),
            status: ItemStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Key used for content-based duplicate detection.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.title, self.item_type, self.priority)
    }
}

/// Lowercase a title and collapse runs of whitespace into single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Soft-uniqueness key: normalized title, type and priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub title: String,
    pub item_type: ItemType,
    pub priority: Priority,
}

impl DedupKey {
    pub fn new(title: &str, item_type: ItemType, priority: Priority) -> Self {
        Self {
            title: normalize_title(title),
            item_type,
            priority,
        }
    }
}

/// Fields for a new item; id and timestamps are derived by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub goal: String,
    pub title: String,
    pub item_type: ItemType,
    pub description: String,
    pub priority: Priority,
}

impl NewItem {
    pub fn new(goal: impl Into<String>, title: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            goal: goal.into(),
            title: title.into(),
            item_type,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub goal: Option<String>,
    pub item_type: Option<ItemType>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<ItemStatus>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ItemUpdate::default()
    }

    /// Apply the set fields to `item` and bump `updated_at`.
    pub fn apply(&self, item: &mut WorkItem) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(goal) = &self.goal {
            item.goal = goal.clone();
        }
        if let Some(item_type) = self.item_type {
            item.item_type = item_type;
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(priority) = self.priority {
            item.priority = priority;
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        item.updated_at = now();
    }
}

/// AND-filter over work items. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive goal match
    pub goal: Option<String>,
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    pub priority: Option<Priority>,
    /// Exact (normalized) tag membership
    pub tag: Option<String>,
    /// Case-insensitive substring of title or description
    pub search: Option<String>,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    pub fn status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }
}

/// Type of relationship between two items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
    /// Source mentions or depends on target
    #[default]
    References,
    /// Source is a later version of target
    EvolvesFrom,
    /// Source was prompted by target
    InspiredBy,
    /// Source contains target
    ParentChild,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::References => "references",
            LinkType::EvolvesFrom => "evolves-from",
            LinkType::InspiredBy => "inspired-by",
            LinkType::ParentChild => "parent-child",
        }
    }

    pub fn all() -> &'static [LinkType] {
        &[
            LinkType::References,
            LinkType::EvolvesFrom,
            LinkType::InspiredBy,
            LinkType::ParentChild,
        ]
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "references" => Ok(LinkType::References),
            "evolves-from" => Ok(LinkType::EvolvesFrom),
            "inspired-by" => Ok(LinkType::InspiredBy),
            "parent-child" => Ok(LinkType::ParentChild),
            _ => Err(Error::InvalidInput(format!("Unknown link type: {}", s))),
        }
    }
}

/// A directed edge. At most one exists per ordered `(source_id, target_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn new(source_id: String, target_id: String, link_type: LinkType) -> Self {
        Self {
            source_id,
            target_id,
            link_type,
            created_at: now(),
        }
    }
}

/// The far end of a link, resolved when the links are queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkPeer {
    Present { title: String },
    /// The peer id no longer names an item (dangling reference)
    Missing,
}

impl LinkPeer {
    pub fn title(&self) -> Option<&str> {
        match self {
            LinkPeer::Present { title } => Some(title),
            LinkPeer::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, LinkPeer::Missing)
    }
}

/// One link as seen from a queried item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub peer_id: String,
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
    pub peer: LinkPeer,
}

/// Link edits applied to one source item as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkChanges {
    /// `(target_id, link_type)` pairs to link to
    pub add: Vec<(String, LinkType)>,
    /// Target ids to unlink; each link must exist
    pub remove: Vec<String>,
}

impl LinkChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, target_id: impl Into<String>, link_type: LinkType) -> Self {
        self.add.push((target_id.into(), link_type));
        self
    }

    pub fn remove(mut self, target_id: impl Into<String>) -> Self {
        self.remove.push(target_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Links of one item in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLinks {
    pub outgoing: Vec<LinkEntry>,
    pub incoming: Vec<LinkEntry>,
}
