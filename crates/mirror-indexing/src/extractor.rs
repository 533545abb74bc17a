//! Turns one primary-store record into a single indexable text string.

use mirror_types::{ColumnTypes, Record};

use crate::html::clean_markup;
use crate::registry::EntityConfig;

/// Separator placed between the values of included fields.
pub const FIELD_SEPARATOR: &str = " . ";

/// Builds the normalized text of a record for one entity type.
///
/// Without an override hook the algorithm is:
/// 1. unwrap the entity-alias nesting level and flatten nested records into
///    dotted paths;
/// 2. keep string values only, skipping the primary key and fields outside
///    the configured whitelist;
/// 3. with column metadata, keep text-like columns only;
/// 4. clean markup from each value and join them with `" . "`;
/// 5. normalize, then run the post-process hook.
///
/// An empty result means there is nothing to index.
pub struct FieldExtractor<'a> {
    entity: &'a EntityConfig,
    columns: Option<&'a ColumnTypes>,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(entity: &'a EntityConfig) -> Self {
        Self {
            entity,
            columns: None,
        }
    }

    /// Restrict extraction to text-like columns.
    pub fn with_columns(mut self, columns: Option<&'a ColumnTypes>) -> Self {
        self.columns = columns;
        self
    }

    pub fn extract(&self, record: &Record) -> String {
        if let Some(extractor) = &self.entity.hooks.extractor {
            return extractor(record);
        }

        let settings = &self.entity.settings;
        let record = record.unwrap_alias(&self.entity.entity_type);

        let parts: Vec<String> = record
            .flatten()
            .into_iter()
            .filter(|(name, value)| {
                value.is_string()
                    && *name != settings.primary_key
                    && settings.fields.allows(name)
                    && self.is_text_column(name)
            })
            .filter_map(|(_, value)| value.as_text().map(|text| clean_markup(&text)))
            .collect();

        let text = normalize(&parts.join(FIELD_SEPARATOR));
        match &self.entity.hooks.post_process {
            Some(post_process) => post_process(text),
            None => text,
        }
    }

    fn is_text_column(&self, name: &str) -> bool {
        match self.columns {
            Some(columns) => columns.get(name).is_some_and(|ty| ty.is_text_like()),
            None => true,
        }
    }
}

/// Drop non-whitespace control characters, collapse whitespace and trim.
pub fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !c.is_control())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
