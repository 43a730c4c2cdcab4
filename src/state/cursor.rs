use crate::error::{AppError, Result};
use crate::models::Incident;
use crate::state::SortOrder;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the last item returned on a page
///
/// Travels to clients as an opaque URL-safe token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub incident_id: String,
}

impl Cursor {
    pub fn encode(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = Base64UrlUnpadded::decode_vec(token)
            .map_err(|_| AppError::InvalidArgument("Invalid pagination cursor".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| AppError::InvalidArgument("Invalid pagination cursor".to_string()))
    }

    /// True if `incident` comes after this position in `order`
    pub fn is_before(&self, incident: &Incident, order: SortOrder) -> bool {
        let position = (&self.created_at, &self.incident_id);
        let candidate = (&incident.created_at, &incident.incident_id);
        match order {
            SortOrder::Descending => candidate < position,
            SortOrder::Ascending => candidate > position,
        }
    }
}

impl From<&Incident> for Cursor {
    fn from(incident: &Incident) -> Self {
        Self {
            created_at: incident.created_at,
            incident_id: incident.incident_id.clone(),
        }
    }
}
