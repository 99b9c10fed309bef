use super::DiscoveryError;
use jsonschema::Validator;
use serde_json::{json, Value as JsonValue};
use serde_yaml::Value as YamlValue;
use std::path::Path;

/// Structural schema used when no external schema file is configured.
pub fn default_schema() -> JsonValue {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["steps"],
        "properties": {
            "version": { "type": ["string", "number"] },
            "session": { "type": "string" },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string" },
                        "commands": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["command"],
                                "properties": {
                                    "command": { "type": "string" }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

pub struct SchemaValidator {
    validator: Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new(schema: &JsonValue) -> Result<Self, DiscoveryError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| DiscoveryError::InvalidSchema(e.to_string()))?;
        Ok(Self { validator })
    }

    pub fn builtin() -> Result<Self, DiscoveryError> {
        Self::new(&default_schema())
    }

    pub fn from_file(path: &Path) -> Result<Self, DiscoveryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: JsonValue = serde_json::from_str(&raw)
            .map_err(|e| DiscoveryError::InvalidSchema(format!("{}: {e}", path.display())))?;
        Self::new(&schema)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, DiscoveryError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Reports the first violation only.
    pub fn validate(&self, document: &YamlValue) -> Result<(), DiscoveryError> {
        let instance = serde_json::to_value(document)
            .map_err(|e| DiscoveryError::Schema(format!("not representable as JSON: {e}")))?;
        if let Some(error) = self.validator.iter_errors(&instance).next() {
            return Err(DiscoveryError::Schema(error.to_string()));
        }
        Ok(())
    }
}
