use crate::error::{AppError, Result};
use crate::models::{Incident, SyncStatus};
use crate::state::{paginate, IncidentStore, IndexPage, IndexQuery};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory incident store (for development and testing)
#[derive(Clone)]
pub struct InMemoryStore {
    incidents: Arc<DashMap<String, Incident>>,
    natural_key_index: Arc<DashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(DashMap::new()),
            natural_key_index: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        match self
            .natural_key_index
            .entry(incident.source_system_external_id.clone())
        {
            Entry::Occupied(existing) => Err(AppError::Duplicate(format!(
                "Incident with natural key {} already exists as {}",
                existing.key(),
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(incident.incident_id.clone());
                self.incidents
                    .insert(incident.incident_id.clone(), incident.clone());
                tracing::debug!(incident_id = %incident.incident_id, "Incident inserted");
                Ok(())
            }
        }
    }

    async fn put_incident(&self, incident: &Incident) -> Result<()> {
        if !self.incidents.contains_key(&incident.incident_id) {
            return Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident.incident_id
            )));
        }

        self.incidents
            .insert(incident.incident_id.clone(), incident.clone());
        self.natural_key_index.insert(
            incident.source_system_external_id.clone(),
            incident.incident_id.clone(),
        );

        tracing::debug!(incident_id = %incident.incident_id, "Incident updated");
        Ok(())
    }

    async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        Ok(self.incidents.get(incident_id).map(|entry| entry.clone()))
    }

    async fn find_by_natural_key(&self, natural_key: &str) -> Result<Option<Incident>> {
        let incident_id = match self.natural_key_index.get(natural_key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        Ok(self.incidents.get(&incident_id).map(|entry| entry.clone()))
    }

    async fn query_index(&self, query: &IndexQuery) -> Result<IndexPage> {
        let candidates: Vec<Incident> = self
            .incidents
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        paginate(candidates, query)
    }

    async fn update_sync_status(&self, incident_id: &str, status: &SyncStatus) -> Result<()> {
        match self.incidents.get_mut(incident_id) {
            Some(mut entry) => {
                entry.sync_status = status.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident_id
            ))),
        }
    }
}
