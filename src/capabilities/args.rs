use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const INCIDENT_ID_PREFIX: &str = "INC-";

/// Decode a capability's arguments object into its typed form
pub fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| AppError::InvalidArgument(format!("Invalid arguments: {}", e)))
}

pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn require_incident_id(incident_id: &str) -> Result<()> {
    if incident_id.trim().starts_with(INCIDENT_ID_PREFIX) {
        Ok(())
    } else {
        Err(AppError::InvalidArgument(format!(
            "incident_id must look like {}<millis>-<suffix>",
            INCIDENT_ID_PREFIX
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: Option<u32>,
    }

    #[test]
    fn test_parse_reports_invalid_arguments() {
        let ok: Sample = parse(json!({"name": "a"})).unwrap();
        assert_eq!(ok.name, "a");
        assert!(ok.count.is_none());

        let err = parse::<Sample>(json!({"name": 5})).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(err.to_string().contains("Invalid arguments"));
    }

    #[test]
    fn test_require_incident_id() {
        assert!(require_incident_id("INC-1714650000000-A1B2C3").is_ok());
        assert!(require_incident_id("JIRA-1").is_err());
    }
}
