//! Configuration Server: a name -> typed value key/value store layered
//! over an injected [`ConfigSource`]. A synchronous `get`/`set`/
//! `domain_create` surface over a pluggable backend, not a layered
//! multi-source merge engine with change notifications.

use crate::error::{CoreError, ErrorCode, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// A configuration value's payload. Matches the small fixed set of scalar
/// kinds the dispatch core needs to marshal across a dataport; no nested
/// lists or dictionaries.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl ConfigValue {
    /// Name of this value's kind, used in `CfgTypeMismatch` messages.
    fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::I64(_) => "i64",
            ConfigValue::Str(_) => "str",
            ConfigValue::Bytes(_) => "bytes",
        }
    }
}

/// A named group of key/value entries. Domains partition the key space so
/// unrelated subsystems can reuse the same key names without collision.
pub type DomainName = String;

/// Backing store a [`ConfigServer`] reads and writes through. The in-memory
/// default below is what every test uses; a real deployment could back
/// this with a TOML file loaded at startup instead.
pub trait ConfigSource: Send + Sync {
    fn get(&self, domain: &str, key: &str) -> Option<ConfigValue>;
    fn set(&self, domain: &str, key: &str, value: ConfigValue);
    fn domain_exists(&self, domain: &str) -> bool;
    fn create_domain(&self, domain: &str) -> Result<()>;
    fn domains(&self) -> Vec<DomainName>;
    /// Every key/value pair currently stored in `domain`, or empty if the
    /// domain doesn't exist. Backs [`ConfigServer::export_toml`].
    fn entries(&self, domain: &str) -> Vec<(String, ConfigValue)>;
}

/// In-memory [`ConfigSource`], the default for tests and for embedders
/// that don't need persistence.
#[derive(Default)]
pub struct MemoryConfigSource {
    domains: RwLock<HashMap<String, HashMap<String, ConfigValue>>>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigSource for MemoryConfigSource {
    fn get(&self, domain: &str, key: &str) -> Option<ConfigValue> {
        self.domains.read().get(domain)?.get(key).cloned()
    }

    fn set(&self, domain: &str, key: &str, value: ConfigValue) {
        self.domains.write().entry(domain.to_string()).or_default().insert(key.to_string(), value);
    }

    fn domain_exists(&self, domain: &str) -> bool {
        self.domains.read().contains_key(domain)
    }

    fn create_domain(&self, domain: &str) -> Result<()> {
        let mut domains = self.domains.write();
        if domains.contains_key(domain) {
            return Err(CoreError::new(
                ErrorCode::CfgDomainExists,
                format!("configuration domain '{domain}' already exists"),
            ));
        }
        domains.insert(domain.to_string(), HashMap::new());
        Ok(())
    }

    fn domains(&self) -> Vec<DomainName> {
        self.domains.read().keys().cloned().collect()
    }

    fn entries(&self, domain: &str) -> Vec<(String, ConfigValue)> {
        self.domains
            .read()
            .get(domain)
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

/// [`ConfigSource`] loaded once from a TOML document, then served the same
/// way as [`MemoryConfigSource`]. A real deployment loads its configuration
/// at image-build time rather than re-reading the document at runtime, so
/// `set`/`create_domain` only ever touch the in-memory copy, never the
/// original text.
pub struct TomlConfigSource {
    domains: RwLock<HashMap<String, HashMap<String, ConfigValue>>>,
}

/// Failure loading a [`TomlConfigSource`]: either the document itself
/// doesn't parse, or a key's value uses a TOML type this store has no
/// `ConfigValue` representation for (floats, arrays, tables-of-tables,
/// datetimes).
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("malformed TOML configuration document")]
    Parse(#[from] toml::de::Error),
    #[error("key '{key}' in domain '{domain}' has unsupported TOML type '{found}'")]
    UnsupportedValueType { domain: String, key: String, found: &'static str },
}

impl From<ConfigLoadError> for CoreError {
    fn from(err: ConfigLoadError) -> Self {
        let code = match &err {
            ConfigLoadError::Parse(_) => ErrorCode::InvalidParameter,
            ConfigLoadError::UnsupportedValueType { .. } => ErrorCode::CfgTypeMismatch,
        };
        let message = err.to_string();
        CoreError::new(code, message).with_cause(err)
    }
}

impl TomlConfigSource {
    /// Parse `text` as a document of `[domain]` tables whose entries become
    /// that domain's key/value pairs.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, ConfigLoadError> {
        let document: toml::Table = toml::from_str(text)?;
        let mut domains = HashMap::new();
        for (domain, value) in document {
            let toml::Value::Table(entries) = value else {
                return Err(ConfigLoadError::UnsupportedValueType {
                    domain: domain.clone(),
                    key: String::new(),
                    found: toml_type_name(&value),
                });
            };
            let mut converted = HashMap::new();
            for (key, v) in entries {
                let value = config_value_from_toml(&domain, &key, v)?;
                converted.insert(key, value);
            }
            domains.insert(domain, converted);
        }
        Ok(Self { domains: RwLock::new(domains) })
    }
}

fn config_value_from_toml(domain: &str, key: &str, value: toml::Value) -> std::result::Result<ConfigValue, ConfigLoadError> {
    match &value {
        toml::Value::Boolean(b) => Ok(ConfigValue::Bool(*b)),
        toml::Value::Integer(i) => Ok(ConfigValue::I64(*i)),
        toml::Value::String(s) => Ok(ConfigValue::Str(s.clone())),
        // `export_toml` round-trips `ConfigValue::Bytes` as an array of
        // 0..=255 integers (TOML has no native byte-string type); accept
        // that shape back, reject anything else array-shaped.
        toml::Value::Array(items) if items.iter().all(is_byte_value) => Ok(ConfigValue::Bytes(
            items
                .iter()
                .map(|v| match v {
                    toml::Value::Integer(b) => *b as u8,
                    _ => unreachable!("filtered by is_byte_value"),
                })
                .collect(),
        )),
        _ => Err(ConfigLoadError::UnsupportedValueType {
            domain: domain.to_string(),
            key: key.to_string(),
            found: toml_type_name(&value),
        }),
    }
}

fn is_byte_value(value: &toml::Value) -> bool {
    matches!(value, toml::Value::Integer(i) if (0..=255).contains(i))
}

fn toml_type_name(value: &toml::Value) -> &'static str {
    match value {
        toml::Value::String(_) => "string",
        toml::Value::Integer(_) => "integer",
        toml::Value::Float(_) => "float",
        toml::Value::Boolean(_) => "boolean",
        toml::Value::Datetime(_) => "datetime",
        toml::Value::Array(_) => "array",
        toml::Value::Table(_) => "table",
    }
}

impl ConfigSource for TomlConfigSource {
    fn get(&self, domain: &str, key: &str) -> Option<ConfigValue> {
        self.domains.read().get(domain)?.get(key).cloned()
    }

    fn set(&self, domain: &str, key: &str, value: ConfigValue) {
        self.domains.write().entry(domain.to_string()).or_default().insert(key.to_string(), value);
    }

    fn domain_exists(&self, domain: &str) -> bool {
        self.domains.read().contains_key(domain)
    }

    fn create_domain(&self, domain: &str) -> Result<()> {
        let mut domains = self.domains.write();
        if domains.contains_key(domain) {
            return Err(CoreError::new(
                ErrorCode::CfgDomainExists,
                format!("configuration domain '{domain}' already exists"),
            ));
        }
        domains.insert(domain.to_string(), HashMap::new());
        Ok(())
    }

    fn domains(&self) -> Vec<DomainName> {
        self.domains.read().keys().cloned().collect()
    }

    fn entries(&self, domain: &str) -> Vec<(String, ConfigValue)> {
        self.domains
            .read()
            .get(domain)
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

/// Name/typed-value store over an injected [`ConfigSource`]. Every
/// operation is a thin validating wrapper: domain existence and value-kind
/// agreement are checked here so the source implementation can stay dumb.
pub struct ConfigServer {
    source: Box<dyn ConfigSource>,
}

/// Serialization shape for [`ConfigServer::export_toml`], kept private so
/// the public [`ConfigValue`] enum stays serde-free.
mod export_repr {
    use serde::Serialize;

    #[derive(Serialize)]
    #[serde(untagged)]
    pub(super) enum ValueRepr {
        Bool(bool),
        I64(i64),
        Str(String),
        Bytes(Vec<u8>),
    }
}

impl ConfigServer {
    pub fn new(source: Box<dyn ConfigSource>) -> Self {
        Self { source }
    }

    pub fn domain_create(&self, domain: &str) -> Result<()> {
        self.source.create_domain(domain)
    }

    pub fn domains(&self) -> Vec<DomainName> {
        self.source.domains()
    }

    /// Snapshot every domain currently in the store as a TOML document,
    /// the inverse of [`TomlConfigSource::from_toml_str`]. `ConfigValue::Bytes`
    /// round-trips as an array of `0..=255` integers, since TOML has no
    /// native byte-string type.
    pub fn export_toml(&self) -> String {
        use export_repr::ValueRepr;
        let mut document: std::collections::BTreeMap<String, std::collections::BTreeMap<String, ValueRepr>> =
            Default::default();
        for domain in self.source.domains() {
            let table = document.entry(domain.clone()).or_default();
            for (key, value) in self.source.entries(&domain) {
                table.insert(
                    key,
                    match value {
                        ConfigValue::Bool(b) => ValueRepr::Bool(b),
                        ConfigValue::I64(i) => ValueRepr::I64(i),
                        ConfigValue::Str(s) => ValueRepr::Str(s),
                        ConfigValue::Bytes(b) => ValueRepr::Bytes(b),
                    },
                );
            }
        }
        toml::to_string(&document).expect("stored config values always serialize to TOML")
    }

    /// `CfgNotFound` if the domain or key is absent.
    pub fn get(&self, domain: &str, key: &str) -> Result<ConfigValue> {
        if !self.source.domain_exists(domain) {
            return Err(CoreError::new(ErrorCode::CfgNotFound, format!("unknown configuration domain '{domain}'")));
        }
        self.source
            .get(domain, key)
            .ok_or_else(|| CoreError::new(ErrorCode::CfgNotFound, format!("no value for key '{key}' in domain '{domain}'")))
    }

    /// Typed accessor: `CfgTypeMismatch` if the stored value is a different
    /// kind than expected by the caller's extractor.
    pub fn get_bool(&self, domain: &str, key: &str) -> Result<bool> {
        match self.get(domain, key)? {
            ConfigValue::Bool(v) => Ok(v),
            other => Err(type_mismatch(key, "bool", other.kind_name())),
        }
    }

    pub fn get_i64(&self, domain: &str, key: &str) -> Result<i64> {
        match self.get(domain, key)? {
            ConfigValue::I64(v) => Ok(v),
            other => Err(type_mismatch(key, "i64", other.kind_name())),
        }
    }

    pub fn get_str(&self, domain: &str, key: &str) -> Result<String> {
        match self.get(domain, key)? {
            ConfigValue::Str(v) => Ok(v),
            other => Err(type_mismatch(key, "str", other.kind_name())),
        }
    }

    pub fn get_bytes(&self, domain: &str, key: &str) -> Result<Vec<u8>> {
        match self.get(domain, key)? {
            ConfigValue::Bytes(v) => Ok(v),
            other => Err(type_mismatch(key, "bytes", other.kind_name())),
        }
    }

    /// `CfgNotFound` if the domain has not been created yet; domains are
    /// never implicitly created by `set`.
    pub fn set(&self, domain: &str, key: &str, value: ConfigValue) -> Result<()> {
        if !self.source.domain_exists(domain) {
            return Err(CoreError::new(ErrorCode::CfgNotFound, format!("unknown configuration domain '{domain}'")));
        }
        self.source.set(domain, key, value);
        Ok(())
    }
}

fn type_mismatch(key: &str, expected: &str, actual: &str) -> CoreError {
    CoreError::new(
        ErrorCode::CfgTypeMismatch,
        format!("key '{key}' is a {actual}, not a {expected}"),
    )
}
