//! Configuration loading for the mirror index.
//!
//! Layered config: defaults -> config file -> env vars.
//! Config file lives at ~/.config/mirror-index/config.toml unless a path is
//! given explicitly. Per-entity settings sit under `[entities.<Name>]`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MirrorError;

/// Which record fields are eligible for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawFieldSelection", into = "RawFieldSelection")]
pub enum FieldSelection {
    /// Every text-like field (`"*"`).
    #[default]
    All,
    /// Only the named fields (dotted paths for nested values).
    Only(Vec<String>),
}

impl FieldSelection {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, field: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Only(fields) => fields.iter().any(|f| f == field),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FieldSelection::All)
    }
}

/// Wire shape: `"*"`, `"title,body"` or `["title", "body"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawFieldSelection {
    Text(String),
    List(Vec<String>),
}

impl From<RawFieldSelection> for FieldSelection {
    fn from(raw: RawFieldSelection) -> Self {
        match raw {
            RawFieldSelection::Text(s) if s.trim() == "*" || s.trim().is_empty() => {
                FieldSelection::All
            }
            RawFieldSelection::Text(s) => FieldSelection::Only(
                s.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            RawFieldSelection::List(list) if list.is_empty() => FieldSelection::All,
            RawFieldSelection::List(list) => FieldSelection::Only(list),
        }
    }
}

impl From<FieldSelection> for RawFieldSelection {
    fn from(selection: FieldSelection) -> Self {
        match selection {
            FieldSelection::All => RawFieldSelection::Text("*".to_string()),
            FieldSelection::Only(list) => RawFieldSelection::List(list),
        }
    }
}

/// What a live record save does when the index write fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexFailurePolicy {
    /// Surface the failure to the caller of the save.
    #[default]
    Strict,
    /// Log the failure and report success.
    BestEffort,
}

/// Resolved backend location for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexLocation {
    /// `scheme://host[:port]` when configured through a URL
    pub host: Option<String>,
    pub index: String,
    pub table: String,
}

impl IndexLocation {
    pub fn new(index: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            host: None,
            index: index.into(),
            table: table.into(),
        }
    }

    /// Identifier used to remember that a table has been provisioned.
    pub fn cache_key(&self) -> String {
        match &self.host {
            Some(host) => format!("{}/{}/{}", host, self.index, self.table),
            None => format!("{}/{}", self.index, self.table),
        }
    }
}

impl fmt::Display for IndexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Per-entity indexing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySettings {
    /// Entity type name as the primary store spells it. Config sources fold
    /// table keys to lowercase, so `[entities.Person]` needs
    /// `name = "Person"` to keep its case.
    #[serde(default)]
    pub name: Option<String>,

    /// Backend URL encoding host, index and (optionally) table:
    /// `http://localhost:9200/customindex/customtable`
    #[serde(default)]
    pub url: Option<String>,

    /// Index name (used when no URL is given, or the URL has no path)
    #[serde(default)]
    pub index: Option<String>,

    /// Table name; defaults to the entity's storage table
    #[serde(default)]
    pub table: Option<String>,

    /// Storage table of the entity in the primary store
    #[serde(default)]
    pub storage_table: Option<String>,

    /// Primary-key field of the entity
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Default number of search results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Fields considered when building the index text
    #[serde(default)]
    pub fields: FieldSelection,

    /// Re-read the full record from the primary store before indexing
    #[serde(default = "default_true")]
    pub query_after_save: bool,

    /// Index on every save (false disables the live-write hook)
    #[serde(default = "default_true")]
    pub rebuild_on_update: bool,

    /// Queue index writes until an explicit flush
    #[serde(default)]
    pub deferred_writes: bool,

    /// Behavior of a live save when the index write fails
    #[serde(default)]
    pub index_failure_policy: IndexFailurePolicy,
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_limit() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            name: None,
            url: None,
            index: None,
            table: None,
            storage_table: None,
            primary_key: default_primary_key(),
            limit: default_limit(),
            fields: FieldSelection::All,
            query_after_save: true,
            rebuild_on_update: true,
            deferred_writes: false,
            index_failure_policy: IndexFailurePolicy::Strict,
        }
    }
}

impl EntitySettings {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The entity type for settings stored under `key`.
    pub fn entity_type_or<'a>(&'a self, key: &'a str) -> &'a str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(key)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_fields(mut self, fields: FieldSelection) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_query_after_save(mut self, enabled: bool) -> Self {
        self.query_after_save = enabled;
        self
    }

    pub fn with_deferred_writes(mut self, enabled: bool) -> Self {
        self.deferred_writes = enabled;
        self
    }

    pub fn with_failure_policy(mut self, policy: IndexFailurePolicy) -> Self {
        self.index_failure_policy = policy;
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Resolve the backend location for an entity.
    ///
    /// URL path segments supply index and table; explicit `index`/`table`
    /// fill whatever the URL leaves out; the table finally falls back to the
    /// storage table, then to the entity name.
    pub fn resolve_location(&self, entity_type: &str) -> Result<IndexLocation, MirrorError> {
        let mut host = None;
        let mut index = None;
        let mut table = None;

        if let Some(raw) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            let url = Url::parse(raw)
                .map_err(|e| MirrorError::Config(format!("invalid url {:?}: {}", raw, e)))?;
            if let Some(h) = url.host_str() {
                host = Some(match url.port() {
                    Some(port) => format!("{}://{}:{}", url.scheme(), h, port),
                    None => format!("{}://{}", url.scheme(), h),
                });
            }
            let mut segments = url
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).map(String::from).collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter();
            index = segments.next();
            table = segments.next();
        }

        let index = index
            .or_else(|| self.index.clone())
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| {
                MirrorError::Config(format!(
                    "missing the \"index\" configuration for entity {}",
                    entity_type
                ))
            })?;

        let table = table
            .or_else(|| self.table.clone())
            .or_else(|| self.storage_table.clone())
            .or_else(|| Some(entity_type.to_string()))
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                MirrorError::Config(format!(
                    "missing the \"table\" configuration for entity {}",
                    entity_type
                ))
            })?;

        Ok(IndexLocation { host, index, table })
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding on-disk indexes
    #[serde(default = "default_index_root")]
    pub index_root: String,

    /// Index used by entities that configure neither `url` nor `index`
    #[serde(default)]
    pub default_index: Option<String>,

    /// Writer memory budget per table, in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Per-entity settings keyed by entity type name
    #[serde(default)]
    pub entities: HashMap<String, EntitySettings>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_index_root() -> String {
    ProjectDirs::from("", "", "mirror-index")
        .map(|p| p.data_local_dir().join("indexes"))
        .unwrap_or_else(|| PathBuf::from("./indexes"))
        .to_string_lossy()
        .to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            index_root: default_index_root(),
            default_index: None,
            writer_memory_mb: default_writer_memory_mb(),
            entities: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/mirror-index/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (MIRROR_*, `__` between nested keys)
    pub fn load(config_path: Option<&str>) -> Result<Self, MirrorError> {
        let config_dir = ProjectDirs::from("", "", "mirror-index")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| MirrorError::Config(e.to_string()))?
            .set_default("index_root", default_index_root())
            .map_err(|e| MirrorError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| MirrorError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // MIRROR_LOG_LEVEL, MIRROR_ENTITIES__Person__LIMIT, ...
        builder = builder.add_source(
            Environment::with_prefix("MIRROR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MirrorError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| MirrorError::Config(e.to_string()))
    }

    /// Settings for an entity, with `default_index` applied.
    ///
    /// Matches the map key or the configured `name`, then falls back to a
    /// case-insensitive match since config sources fold key case. Unknown
    /// entities get the defaults.
    pub fn entity(&self, entity_type: &str) -> EntitySettings {
        let mut settings = self
            .entities
            .get(entity_type)
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|(key, s)| s.entity_type_or(key) == entity_type)
                    .map(|(_, s)| s)
            })
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|(key, s)| s.entity_type_or(key).eq_ignore_ascii_case(entity_type))
                    .map(|(_, s)| s)
            })
            .cloned()
            .unwrap_or_default();
        if settings.url.is_none() && settings.index.is_none() {
            settings.index = self.default_index.clone();
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_entity_settings() {
        let settings = EntitySettings::default();
        assert_eq!(settings.limit, 200);
        assert_eq!(settings.fields, FieldSelection::All);
        assert!(settings.query_after_save);
        assert!(settings.rebuild_on_update);
        assert!(!settings.deferred_writes);
        assert_eq!(settings.index_failure_policy, IndexFailurePolicy::Strict);
        assert_eq!(settings.primary_key, "id");
    }

    #[test]
    fn test_resolve_location_from_url() {
        let settings = EntitySettings::default().with_url("http://localhost2:9200/customindex/customtable");
        let location = settings.resolve_location("User2").unwrap();
        assert_eq!(location.host.as_deref(), Some("http://localhost2:9200"));
        assert_eq!(location.index, "customindex");
        assert_eq!(location.table, "customtable");
    }

    #[test]
    fn test_resolve_location_url_without_table() {
        let mut settings = EntitySettings::default().with_url("http://localhost:9200/customindex");
        settings.storage_table = Some("users".to_string());
        let location = settings.resolve_location("User").unwrap();
        assert_eq!(location.index, "customindex");
        assert_eq!(location.table, "users");
    }

    #[test]
    fn test_resolve_location_explicit() {
        let settings = EntitySettings::default()
            .with_index("customindex")
            .with_table("customtable");
        let location = settings.resolve_location("User3").unwrap();
        assert_eq!(location, IndexLocation::new("customindex", "customtable"));
        assert_eq!(location.cache_key(), "customindex/customtable");
    }

    #[test]
    fn test_resolve_location_table_defaults() {
        let mut settings = EntitySettings::default().with_index("main");
        assert_eq!(settings.resolve_location("Person").unwrap().table, "Person");

        settings.storage_table = Some("people".to_string());
        assert_eq!(settings.resolve_location("Person").unwrap().table, "people");
    }

    #[test]
    fn test_resolve_location_missing_index() {
        let err = EntitySettings::default().resolve_location("Person").unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
        assert!(err.to_string().contains("index"));
    }

    #[test]
    fn test_resolve_location_bad_url() {
        let err = EntitySettings::default()
            .with_url("not a url")
            .resolve_location("Person")
            .unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }

    #[test]
    fn test_field_selection_forms() {
        let all: FieldSelection = serde_json::from_str("\"*\"").unwrap();
        assert!(all.is_all());

        let csv: FieldSelection = serde_json::from_str("\"title, email\"").unwrap();
        assert_eq!(csv, FieldSelection::only(["title", "email"]));
        assert!(csv.allows("email"));
        assert!(!csv.allows("bio"));

        let list: FieldSelection = serde_json::from_str("[\"name\"]").unwrap();
        assert_eq!(list, FieldSelection::only(["name"]));

        assert_eq!(serde_json::to_string(&FieldSelection::All).unwrap(), "\"*\"");
    }

    #[test]
    fn test_failure_policy_serialization() {
        let policy: IndexFailurePolicy = serde_json::from_str("\"best_effort\"").unwrap();
        assert_eq!(policy, IndexFailurePolicy::BestEffort);
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.writer_memory_mb, 50);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mirror.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
default_index = "site"

[entities.Person]
fields = "name,email"
limit = 25
index_failure_policy = "best_effort"

[entities.Page]
url = "http://search.local:9200/content/pages"
deferred_writes = true
"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();

        let person = settings.entity("Person");
        assert_eq!(person.fields, FieldSelection::only(["name", "email"]));
        assert_eq!(person.limit, 25);
        assert_eq!(person.index.as_deref(), Some("site"));
        assert_eq!(person.index_failure_policy, IndexFailurePolicy::BestEffort);

        let page = settings.entity("Page");
        assert!(page.deferred_writes);
        assert_eq!(page.resolve_location("Page").unwrap().table, "pages");

        let unknown = settings.entity("Widget");
        assert_eq!(unknown.index.as_deref(), Some("site"));
    }

    #[test]
    fn test_configured_name_keeps_case() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mirror.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[entities.BlogPost]
name = "BlogPost"
index = "site"
limit = 7
"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        let (key, entry) = settings.entities.iter().next().unwrap();
        assert_eq!(entry.entity_type_or(key), "BlogPost");
        assert_eq!(settings.entity("BlogPost").limit, 7);
        assert_eq!(settings.entity("blogpost").limit, 7);
    }

    #[test]
    fn test_blank_name_falls_back_to_key() {
        let settings = EntitySettings::default().with_name("  ");
        assert_eq!(settings.entity_type_or("Person"), "Person");
        assert_eq!(EntitySettings::default().entity_type_or("Person"), "Person");
    }
}
