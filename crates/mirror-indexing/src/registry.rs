//! Per-entity configuration and hooks.
//!
//! The registry is the single place entity settings live. Each entry carries
//! the resolved backend location (resolution failures surface at
//! registration) and optional hooks that replace parts of the default
//! indexing behavior.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mirror_types::{AssociationKey, EntitySettings, IndexLocation, Record, Settings};

use crate::error::IndexingError;
use crate::store::StoreError;

/// Replaces field extraction entirely; its result is indexed verbatim.
pub type ExtractorFn = Arc<dyn Fn(&Record) -> String + Send + Sync>;

/// Runs on the normalized text as the last extraction step.
pub type PostProcessFn = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Loads the record to index in place of a plain primary-store read.
pub type FetchFn =
    Arc<dyn Fn(&AssociationKey) -> Result<Option<Record>, StoreError> + Send + Sync>;

/// Optional behavior overrides for one entity type.
#[derive(Clone, Default)]
pub struct EntityHooks {
    pub extractor: Option<ExtractorFn>,
    pub post_process: Option<PostProcessFn>,
    pub fetch: Option<FetchFn>,
}

impl EntityHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor(mut self, f: impl Fn(&Record) -> String + Send + Sync + 'static) -> Self {
        self.extractor = Some(Arc::new(f));
        self
    }

    pub fn with_post_process(
        mut self,
        f: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.post_process = Some(Arc::new(f));
        self
    }

    pub fn with_fetch(
        mut self,
        f: impl Fn(&AssociationKey) -> Result<Option<Record>, StoreError> + Send + Sync + 'static,
    ) -> Self {
        self.fetch = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for EntityHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHooks")
            .field("extractor", &self.extractor.is_some())
            .field("post_process", &self.post_process.is_some())
            .field("fetch", &self.fetch.is_some())
            .finish()
    }
}

/// Everything the indexer needs to know about one entity type.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub entity_type: String,
    pub settings: EntitySettings,
    pub location: IndexLocation,
    pub hooks: EntityHooks,
}

impl EntityConfig {
    /// Build an entry, resolving the backend location.
    pub fn new(
        entity_type: impl Into<String>,
        settings: EntitySettings,
    ) -> Result<Self, IndexingError> {
        let entity_type = entity_type.into();
        let location = settings.resolve_location(&entity_type)?;
        Ok(Self {
            entity_type,
            settings,
            location,
            hooks: EntityHooks::default(),
        })
    }

    pub fn with_hooks(mut self, hooks: EntityHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn primary_key(&self) -> &str {
        &self.settings.primary_key
    }
}

/// Registry of indexed entity types.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Arc<EntityConfig>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every entity named in the settings.
    ///
    /// An entry's `name` is its entity type; the map key is used only when
    /// no name is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, IndexingError> {
        let mut registry = Self::new();
        for (key, entry) in &settings.entities {
            let entity_type = entry.entity_type_or(key);
            let config = EntityConfig::new(entity_type, settings.entity(entity_type))?;
            registry.register(config);
        }
        Ok(registry)
    }

    /// Add or replace an entity.
    pub fn register(&mut self, config: EntityConfig) -> &mut Self {
        self.entities
            .insert(config.entity_type.clone(), Arc::new(config));
        self
    }

    /// Attach hooks to a registered entity.
    pub fn set_hooks(&mut self, entity_type: &str, hooks: EntityHooks) -> Result<(), IndexingError> {
        let existing = self.get(entity_type)?;
        let updated = (*existing).clone().with_hooks(hooks);
        self.entities
            .insert(updated.entity_type.clone(), Arc::new(updated));
        Ok(())
    }

    /// Look up an entity, falling back to a case-insensitive match.
    pub fn get(&self, entity_type: &str) -> Result<Arc<EntityConfig>, IndexingError> {
        self.entities
            .get(entity_type)
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(entity_type))
                    .map(|(_, config)| config)
            })
            .cloned()
            .ok_or_else(|| {
                IndexingError::Config(format!("entity type {} is not registered", entity_type))
            })
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_registration_resolves_location() {
        let config = EntityConfig::new(
            "Person",
            EntitySettings::default().with_index("site"),
        )
        .unwrap();
        assert_eq!(config.location, IndexLocation::new("site", "Person"));
        assert_eq!(config.primary_key(), "id");
    }

    #[test]
    fn test_missing_index_fails_at_registration() {
        let err = EntityConfig::new("Person", EntitySettings::default()).unwrap_err();
        assert!(matches!(err, IndexingError::Config(_)));
    }

    #[test]
    fn test_unknown_entity() {
        let registry = EntityRegistry::new();
        assert!(matches!(
            registry.get("Ghost"),
            Err(IndexingError::Config(_))
        ));
    }

    #[test]
    fn test_from_settings_and_hooks() {
        let mut entities = HashMap::new();
        entities.insert(
            "Page".to_string(),
            EntitySettings::default().with_table("pages"),
        );
        let settings = Settings {
            default_index: Some("site".to_string()),
            entities,
            ..Settings::default()
        };

        let mut registry = EntityRegistry::from_settings(&settings).unwrap();
        let page = registry.get("Page").unwrap();
        assert_eq!(page.location, IndexLocation::new("site", "pages"));
        assert!(page.hooks.extractor.is_none());

        registry
            .set_hooks(
                "Page",
                EntityHooks::new().with_post_process(|text| text.to_uppercase()),
            )
            .unwrap();
        let page = registry.get("Page").unwrap();
        let hook = page.hooks.post_process.as_ref().unwrap();
        assert_eq!(hook("abc".to_string()), "ABC");
        assert_eq!(registry.entity_types().collect::<Vec<_>>(), vec!["Page"]);
    }

    #[test]
    fn test_configured_name_survives_folded_key() {
        let mut entities = HashMap::new();
        entities.insert(
            "person".to_string(),
            EntitySettings::default().with_name("Person").with_index("site"),
        );
        let settings = Settings {
            entities,
            ..Settings::default()
        };

        let mut registry = EntityRegistry::from_settings(&settings).unwrap();
        let person = registry.get("Person").unwrap();
        assert_eq!(person.entity_type, "Person");
        assert_eq!(person.location, IndexLocation::new("site", "Person"));

        registry.set_hooks("PERSON", EntityHooks::new()).unwrap();
        assert_eq!(registry.entity_types().collect::<Vec<_>>(), vec!["Person"]);
    }
}
