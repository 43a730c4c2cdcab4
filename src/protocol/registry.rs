use crate::error::{AppError, Result};
use crate::protocol::InvocationContext;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named operation invokable through `tools/call`
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the `arguments` object
    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &InvocationContext) -> Result<Value>;
}

/// What `tools/list` reports for one capability
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct RegisteredCapability {
    pub descriptor: CapabilityDescriptor,
    required: Vec<String>,
    capability: Arc<dyn Capability>,
}

impl RegisteredCapability {
    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    /// Required schema fields absent (or null) in `args`
    pub fn missing_required(&self, args: &Value) -> Vec<&str> {
        self.required
            .iter()
            .filter(|field| args.get(field.as_str()).map(Value::is_null).unwrap_or(true))
            .map(String::as_str)
            .collect()
    }
}

/// Immutable name-keyed capability table, in registration order
pub struct CapabilityRegistry {
    entries: Vec<RegisteredCapability>,
    by_name: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Result<Self> {
        let mut entries = Vec::with_capacity(capabilities.len());
        let mut by_name = HashMap::with_capacity(capabilities.len());

        for capability in capabilities {
            let name = capability.name().to_string();
            if by_name.contains_key(&name) {
                return Err(AppError::Configuration(format!(
                    "Capability {} registered twice",
                    name
                )));
            }

            let input_schema = capability.input_schema();
            let required = input_schema
                .get("required")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            by_name.insert(name.clone(), entries.len());
            entries.push(RegisteredCapability {
                descriptor: CapabilityDescriptor {
                    name,
                    description: capability.description().to_string(),
                    input_schema,
                },
                required,
                capability,
            });
        }

        Ok(Self { entries, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredCapability> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl Capability for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "fixed"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"a": {"type": "string"}}, "required": ["a"]})
        }

        async fn execute(&self, _args: Value, _ctx: &InvocationContext) -> Result<Value> {
            Ok(json!({}))
        }
    }

    #[test]
    fn test_registry_preserves_order() {
        let capabilities: Vec<Arc<dyn Capability>> =
            vec![Arc::new(Fixed("zeta")), Arc::new(Fixed("alpha"))];
        let registry = CapabilityRegistry::new(capabilities).unwrap();

        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("beta").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let capabilities: Vec<Arc<dyn Capability>> =
            vec![Arc::new(Fixed("a")), Arc::new(Fixed("a"))];
        assert!(CapabilityRegistry::new(capabilities).is_err());
    }

    #[test]
    fn test_missing_required() {
        let capabilities: Vec<Arc<dyn Capability>> = vec![Arc::new(Fixed("a"))];
        let registry = CapabilityRegistry::new(capabilities).unwrap();
        let entry = registry.get("a").unwrap();

        assert_eq!(entry.missing_required(&json!({})), vec!["a"]);
        assert_eq!(entry.missing_required(&json!({"a": null})), vec!["a"]);
        assert!(entry.missing_required(&json!({"a": "x"})).is_empty());
    }
}
