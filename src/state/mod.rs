pub mod cursor;
pub mod factory;
pub mod sled_store;
pub mod store;

pub use cursor::Cursor;
pub use factory::{create_in_memory_store, create_store};
pub use sled_store::SledStore;
pub use store::*;

use crate::error::Result;
use crate::models::{Incident, SyncStatus};
use async_trait::async_trait;

/// Default page size for index queries
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Hard upper bound on the page size of index queries
pub const MAX_PAGE_SIZE: usize = 50;

/// Trait for incident storage operations
///
/// Records are never deleted. Writes are whole-record replacements with no
/// version check, so concurrent writers to one incident race and the later
/// write wins.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert a new incident, failing `Duplicate` if its natural key is taken
    async fn insert_incident(&self, incident: &Incident) -> Result<()>;

    /// Replace an existing incident, keeping every index in step
    async fn put_incident(&self, incident: &Incident) -> Result<()>;

    /// Get an incident by ID
    async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>>;

    /// Look up an incident by its `SOURCE#EXTERNAL_ID` key
    async fn find_by_natural_key(&self, natural_key: &str) -> Result<Option<Incident>>;

    /// Ordered range lookup over one of the secondary indexes
    async fn query_index(&self, query: &IndexQuery) -> Result<IndexPage>;

    /// Overwrite only the `sync_status` sub-record
    async fn update_sync_status(&self, incident_id: &str, status: &SyncStatus) -> Result<()>;
}

/// Secondary indexes maintained by every store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexName {
    /// Partitioned by assignee, sorted by `STATUS#PRIORITY#CREATED`
    AssignedStatus,
    /// Partitioned by status, sorted by `PRIORITY#CREATED`
    StatusPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently created first
    #[default]
    Descending,
    /// Oldest first
    Ascending,
}

/// Range query over a secondary index
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index: IndexName,
    pub partition: String,
    /// Narrows matches to sort keys starting with this prefix
    pub sort_prefix: Option<String>,
    pub limit: usize,
    /// Continuation token from a previous page
    pub cursor: Option<String>,
    pub order: SortOrder,
    /// Drop records already marked synced before the limit is applied
    pub unsynced_only: bool,
}

impl IndexQuery {
    pub fn new(index: IndexName, partition: impl Into<String>) -> Self {
        Self {
            index,
            partition: partition.into(),
            sort_prefix: None,
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
            order: SortOrder::Descending,
            unsynced_only: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = Some(prefix.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn unsynced_only(mut self) -> Self {
        self.unsynced_only = true;
        self
    }

    /// Partition and sort key of `incident` in this query's index, if indexed
    pub fn index_entry(index: IndexName, incident: &Incident) -> Option<(String, &str)> {
        match index {
            IndexName::AssignedStatus => incident
                .assigned_to
                .as_ref()
                .map(|assignee| (assignee.clone(), incident.status_priority_created.as_str())),
            IndexName::StatusPriority => Some((
                incident.status.to_string(),
                incident.priority_created.as_str(),
            )),
        }
    }

    /// Check whether `incident` falls inside this query's key range
    pub fn matches(&self, incident: &Incident) -> bool {
        match Self::index_entry(self.index, incident) {
            Some((partition, sort_key)) => {
                partition == self.partition
                    && self
                        .sort_prefix
                        .as_deref()
                        .map(|prefix| sort_key.starts_with(prefix))
                        .unwrap_or(true)
            }
            None => false,
        }
    }
}

/// One page of index results
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    pub items: Vec<Incident>,
    pub next_cursor: Option<String>,
}

/// Order, filter and cut a candidate set down to one page
pub(crate) fn paginate(mut candidates: Vec<Incident>, query: &IndexQuery) -> Result<IndexPage> {
    let after = query.cursor.as_deref().map(Cursor::decode).transpose()?;

    if query.unsynced_only {
        candidates.retain(|incident| !incident.sync_status.synced);
    }

    candidates.sort_by(|a, b| {
        let ordering = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.incident_id.cmp(&b.incident_id));
        match query.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });

    if let Some(after) = after {
        candidates.retain(|incident| after.is_before(incident, query.order));
    }

    let has_more = candidates.len() > query.limit;
    candidates.truncate(query.limit);

    let next_cursor = if has_more {
        candidates.last().map(|last| Cursor::from(last).encode()).transpose()?
    } else {
        None
    };

    Ok(IndexPage {
        items: candidates,
        next_cursor,
    })
}
