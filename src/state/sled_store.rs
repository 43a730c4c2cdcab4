use crate::error::{AppError, Result};
use crate::models::{Incident, SyncStatus};
use crate::state::{paginate, IncidentStore, IndexName, IndexPage, IndexQuery};
use async_trait::async_trait;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    Transactional, TransactionalTree,
};
use sled::Db;
use std::path::Path;
use std::sync::Arc;

const KEY_DELIMITER: u8 = 0;

/// Persistent incident store using Sled embedded database
///
/// Records are stored as JSON in `incidents`. Each secondary index lives in
/// its own tree with keys `partition \0 sort_key \0 incident_id`, so a prefix
/// scan yields one partition in sort order.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    incidents_tree: sled::Tree,
    assigned_status_tree: sled::Tree,
    status_priority_tree: sled::Tree,
    natural_key_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let open = |name: &str| {
            db.open_tree(name).map_err(|e| {
                AppError::Database(format!("Failed to open {} tree: {}", name, e))
            })
        };

        let incidents_tree = open("incidents")?;
        let assigned_status_tree = open("idx_assigned_status")?;
        let status_priority_tree = open("idx_status_priority")?;
        let natural_key_tree = open("idx_natural_key")?;

        tracing::info!("Initialized Sled store at {:?}", path_ref);

        Ok(Self {
            db: Arc::new(db),
            incidents_tree,
            assigned_status_tree,
            status_priority_tree,
            natural_key_tree,
        })
    }

    fn serialize_incident(incident: &Incident) -> Result<Vec<u8>> {
        serde_json::to_vec(incident).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize incident: {}", e))
        })
    }

    fn deserialize_incident(bytes: &[u8]) -> Result<Incident> {
        serde_json::from_slice(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize incident: {}", e))
        })
    }

    fn index_key(partition: &str, sort_key: &str, incident_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(partition.len() + sort_key.len() + incident_id.len() + 2);
        key.extend_from_slice(partition.as_bytes());
        key.push(KEY_DELIMITER);
        key.extend_from_slice(sort_key.as_bytes());
        key.push(KEY_DELIMITER);
        key.extend_from_slice(incident_id.as_bytes());
        key
    }

    /// Scan prefix for a query; an absent sort prefix covers the whole partition
    fn scan_prefix(query: &IndexQuery) -> Vec<u8> {
        let mut prefix = query.partition.as_bytes().to_vec();
        prefix.push(KEY_DELIMITER);
        if let Some(sort_prefix) = &query.sort_prefix {
            prefix.extend_from_slice(sort_prefix.as_bytes());
        }
        prefix
    }

    fn index_tree(&self, index: IndexName) -> &sled::Tree {
        match index {
            IndexName::AssignedStatus => &self.assigned_status_tree,
            IndexName::StatusPriority => &self.status_priority_tree,
        }
    }

    fn index_keys(incident: &Incident) -> (Option<Vec<u8>>, Vec<u8>) {
        let assigned = IndexQuery::index_entry(IndexName::AssignedStatus, incident)
            .map(|(partition, sort_key)| Self::index_key(&partition, sort_key, &incident.incident_id));
        let (status, sort_key) = (
            incident.status.to_string(),
            incident.priority_created.as_str(),
        );
        let by_status = Self::index_key(&status, sort_key, &incident.incident_id);
        (assigned, by_status)
    }

    /// Write the record plus every index entry in one multi-tree transaction
    fn write(&self, incident: &Incident, must_be_new: bool) -> Result<()> {
        let id_key = incident.incident_id.as_bytes().to_vec();
        let natural_key = incident.source_system_external_id.as_bytes().to_vec();
        let value = Self::serialize_incident(incident)?;
        let (assigned_key, status_key) = Self::index_keys(incident);

        let result = (
            &self.incidents_tree,
            &self.assigned_status_tree,
            &self.status_priority_tree,
            &self.natural_key_tree,
        )
            .transaction(|(incidents, assigned, by_status, natural)| -> ConflictableTransactionResult<(), AppError> {
                let previous = incidents.get(&id_key)?;

                if must_be_new {
                    if let Some(owner) = natural.get(&natural_key)? {
                        return Err(ConflictableTransactionError::Abort(AppError::Duplicate(
                            format!(
                                "Incident with natural key {} already exists as {}",
                                incident.source_system_external_id,
                                String::from_utf8_lossy(&owner)
                            ),
                        )));
                    }
                } else if previous.is_none() {
                    return Err(ConflictableTransactionError::Abort(AppError::NotFound(
                        format!("Incident {} not found", incident.incident_id),
                    )));
                }

                if let Some(previous) = &previous {
                    let old = Self::deserialize_incident(previous)
                        .map_err(ConflictableTransactionError::Abort)?;
                    Self::remove_index_entries(&old, assigned, by_status)?;
                }

                incidents.insert(id_key.as_slice(), value.as_slice())?;
                if let Some(key) = &assigned_key {
                    assigned.insert(key.as_slice(), id_key.as_slice())?;
                }
                by_status.insert(status_key.as_slice(), id_key.as_slice())?;
                natural.insert(natural_key.as_slice(), id_key.as_slice())?;
                Ok(())
            });

        result.map_err(Self::transaction_error)
    }

    fn remove_index_entries(
        old: &Incident,
        assigned: &TransactionalTree,
        by_status: &TransactionalTree,
    ) -> ConflictableTransactionResult<(), AppError> {
        let (old_assigned, old_status) = Self::index_keys(old);
        if let Some(key) = old_assigned {
            assigned.remove(key)?;
        }
        by_status.remove(old_status)?;
        Ok(())
    }

    fn transaction_error(err: TransactionError<AppError>) -> AppError {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => AppError::Database(e.to_string()),
        }
    }

    fn load(&self, id_key: &[u8]) -> Result<Option<Incident>> {
        match self.incidents_tree.get(id_key) {
            Ok(Some(bytes)) => Ok(Some(Self::deserialize_incident(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AppError::Database(format!("Failed to get incident: {}", e))),
        }
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for SledStore {
    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        self.write(incident, true)?;
        self.flush().await?;
        tracing::debug!(incident_id = %incident.incident_id, "Incident inserted into Sled");
        Ok(())
    }

    async fn put_incident(&self, incident: &Incident) -> Result<()> {
        self.write(incident, false)?;
        self.flush().await?;
        tracing::debug!(incident_id = %incident.incident_id, "Incident updated in Sled");
        Ok(())
    }

    async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        self.load(incident_id.as_bytes())
    }

    async fn find_by_natural_key(&self, natural_key: &str) -> Result<Option<Incident>> {
        match self.natural_key_tree.get(natural_key.as_bytes())? {
            Some(id_key) => self.load(&id_key),
            None => Ok(None),
        }
    }

    async fn query_index(&self, query: &IndexQuery) -> Result<IndexPage> {
        let tree = self.index_tree(query.index);
        let mut candidates = Vec::new();

        for entry in tree.scan_prefix(Self::scan_prefix(query)) {
            let (_, id_key) = entry?;
            match self.load(&id_key) {
                Ok(Some(incident)) if query.matches(&incident) => candidates.push(incident),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        incident_id = %String::from_utf8_lossy(&id_key),
                        error = %e,
                        "Skipping unreadable incident during index scan"
                    );
                }
            }
        }

        paginate(candidates, query)
    }

    async fn update_sync_status(&self, incident_id: &str, status: &SyncStatus) -> Result<()> {
        let id_key = incident_id.as_bytes().to_vec();

        let result = self
            .incidents_tree
            .transaction(|incidents| -> ConflictableTransactionResult<(), AppError> {
            let bytes = incidents.get(&id_key)?.ok_or_else(|| {
                ConflictableTransactionError::Abort(AppError::NotFound(format!(
                    "Incident {} not found",
                    incident_id
                )))
            })?;
            let mut incident =
                Self::deserialize_incident(&bytes).map_err(ConflictableTransactionError::Abort)?;
            incident.sync_status = status.clone();
            let value =
                Self::serialize_incident(&incident).map_err(ConflictableTransactionError::Abort)?;
            incidents.insert(id_key.as_slice(), value)?;
            Ok(())
        });

        result.map_err(Self::transaction_error)?;
        self.flush().await
    }
}
