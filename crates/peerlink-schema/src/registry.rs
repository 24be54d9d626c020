use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use peerlink_codec::CHAT;
use serde_json::Value;

use crate::builtin::{chat_schema, service_schema};
use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_value;

const SCHEMA_FILE_SUFFIX: &str = ".schema.json";

/// Envelope-type-keyed registry of compiled JSON Schema validators.
pub struct EnvelopeSchemas {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl EnvelopeSchemas {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Registry holding the chat schema and the service-family schema.
    pub fn builtin(service_tag: &str) -> Result<Self> {
        Self::builtin_with_config(service_tag, RegistryConfig::default())
    }

    /// Builtin schemas with explicit config.
    pub fn builtin_with_config(service_tag: &str, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        registry.register_value(CHAT, &chat_schema())?;
        registry.register_value(service_tag, &service_schema(service_tag))?;
        Ok(registry)
    }

    /// Register a schema for an envelope type from a JSON string.
    pub fn register(&mut self, kind: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(kind, &schema)
    }

    /// Register a schema for an envelope type from a JSON value.
    pub fn register_value(&mut self, kind: &str, schema: &Value) -> Result<()> {
        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let compiled = jsonschema::validator_for(&schema_to_compile)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        self.validators.insert(kind.to_string(), compiled);
        Ok(())
    }

    /// Load from embedded `(type, schema)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (kind, schema) in schemas {
            registry.register(kind, schema)?;
        }
        Ok(registry)
    }

    /// Load `<type>.schema.json` files from a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    ///
    /// Symlinked schema files are refused. Other files are skipped.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut loaded = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(kind) = kind_from_file_name(&file_name) else {
                continue;
            };

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !metadata.file_type().is_file() {
                continue;
            }

            loaded = loaded.saturating_add(1);
            if loaded > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    registry.config.max_schemas_from_directory
                )));
            }

            let content = read_bounded(&entry_path, registry.config.max_schema_file_size)?;
            tracing::debug!(kind, file = %entry_path.display(), "loading envelope schema");
            registry.register(kind, &content)?;
        }

        Ok(registry)
    }

    /// Validate an envelope value against the schema for its `type`.
    pub fn validate(&self, envelope: &Value) -> Result<()> {
        let kind = envelope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match self.validators.get(kind) {
            Some(validator) => validate_value(kind, envelope, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(kind.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Parse and validate wire text.
    pub fn validate_text(&self, text: &str) -> Result<()> {
        let value: Value = serde_json::from_str(text)?;
        self.validate(&value)
    }

    /// Check if an envelope type has a registered schema.
    pub fn has_schema(&self, kind: &str) -> bool {
        self.validators.contains_key(kind)
    }

    /// Envelope types with registered schemas, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for EnvelopeSchemas {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvelopeSchemas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSchemas")
            .field("kinds", &self.kinds())
            .field("config", &self.config)
            .finish()
    }
}

fn kind_from_file_name(file_name: &str) -> Option<&str> {
    let kind = file_name.strip_suffix(SCHEMA_FILE_SUFFIX)?;
    let valid = !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(kind)
}

fn read_bounded(path: &Path, max_bytes: usize) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large (max {max_bytes} bytes): {}",
            path.display()
        )));
    }
    Ok(content)
}

// Only schemas that declare `properties` are closed. Branch keywords
// (`oneOf`, `anyOf`, `not`) that merely restate `required` stay open.
fn apply_strict_mode(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };

    if map.contains_key("properties") && !map.contains_key("additionalProperties") {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for key in ["properties", "$defs", "definitions"] {
        if let Some(Value::Object(children)) = map.get_mut(key) {
            children.values_mut().for_each(apply_strict_mode);
        }
    }
    if let Some(items) = map.get_mut("items") {
        apply_strict_mode(items);
    }
}
