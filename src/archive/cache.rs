//! In-memory cache of archive entities.
//!
//! Holds correspondents, document types, tags, storage paths and custom
//! field definitions, with case-insensitive name→id lookup for each.
//! Loaded eagerly at startup, refreshed after entity creation. No TTL —
//! the entity sets only change through this service or rare manual edits,
//! and a manual refresh is always available.
//!
//! Ownership: callers hold an injected reference (`Arc<RwLock<_>>` at the
//! service level); there is no global instance.

use std::collections::HashMap;

use crate::archive::client::ArchiveClient;
use crate::archive::models::{
    Correspondent, CustomFieldDefinition, DocumentType, StoragePath, Tag,
};
use crate::archive::ArchiveError;

#[derive(Debug, Default)]
pub struct EntityCache {
    correspondents: HashMap<i64, Correspondent>,
    document_types: HashMap<i64, DocumentType>,
    tags: HashMap<i64, Tag>,
    storage_paths: HashMap<i64, StoragePath>,
    custom_fields: HashMap<i64, CustomFieldDefinition>,

    // lowercase name → id
    correspondent_names: HashMap<String, i64>,
    document_type_names: HashMap<String, i64>,
    tag_names: HashMap<String, i64>,
    storage_path_names: HashMap<String, i64>,
    custom_field_names: HashMap<String, i64>,
}

/// Entry counts per category, for the health endpoint and startup log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub correspondents: usize,
    pub document_types: usize,
    pub tags: usize,
    pub storage_paths: usize,
    pub custom_fields: usize,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one category has been loaded.
    pub fn is_loaded(&self) -> bool {
        !self.correspondents.is_empty()
            || !self.document_types.is_empty()
            || !self.tags.is_empty()
            || !self.storage_paths.is_empty()
            || !self.custom_fields.is_empty()
    }

    /// Reload every category from the archive.
    pub fn refresh(&mut self, client: &dyn ArchiveClient) -> Result<(), ArchiveError> {
        self.set_correspondents(client.list_correspondents()?);
        self.set_document_types(client.list_document_types()?);
        self.set_tags(client.list_tags()?);
        self.set_storage_paths(client.list_storage_paths()?);
        self.set_custom_fields(client.list_custom_fields()?);
        let stats = self.stats();
        tracing::info!(
            correspondents = stats.correspondents,
            document_types = stats.document_types,
            tags = stats.tags,
            storage_paths = stats.storage_paths,
            custom_fields = stats.custom_fields,
            "entity cache refreshed"
        );
        Ok(())
    }

    // ── Population ──────────────────────────────────────────

    pub fn set_correspondents(&mut self, items: Vec<Correspondent>) {
        self.correspondent_names = items
            .iter()
            .map(|c| (c.name.to_lowercase(), c.id))
            .collect();
        self.correspondents = items.into_iter().map(|c| (c.id, c)).collect();
    }

    pub fn set_document_types(&mut self, items: Vec<DocumentType>) {
        self.document_type_names = items
            .iter()
            .map(|d| (d.name.to_lowercase(), d.id))
            .collect();
        self.document_types = items.into_iter().map(|d| (d.id, d)).collect();
    }

    pub fn set_tags(&mut self, items: Vec<Tag>) {
        self.tag_names = items.iter().map(|t| (t.name.to_lowercase(), t.id)).collect();
        self.tags = items.into_iter().map(|t| (t.id, t)).collect();
    }

    pub fn set_storage_paths(&mut self, items: Vec<StoragePath>) {
        self.storage_path_names = items
            .iter()
            .map(|s| (s.name.to_lowercase(), s.id))
            .collect();
        self.storage_paths = items.into_iter().map(|s| (s.id, s)).collect();
    }

    pub fn set_custom_fields(&mut self, items: Vec<CustomFieldDefinition>) {
        self.custom_field_names = items
            .iter()
            .map(|f| (f.name.to_lowercase(), f.id))
            .collect();
        self.custom_fields = items.into_iter().map(|f| (f.id, f)).collect();
    }

    // ── Name → id (case-insensitive) ────────────────────────

    pub fn correspondent_id(&self, name: &str) -> Option<i64> {
        self.correspondent_names.get(&name.to_lowercase()).copied()
    }

    pub fn document_type_id(&self, name: &str) -> Option<i64> {
        self.document_type_names.get(&name.to_lowercase()).copied()
    }

    pub fn tag_id(&self, name: &str) -> Option<i64> {
        self.tag_names.get(&name.to_lowercase()).copied()
    }

    pub fn storage_path_id(&self, name: &str) -> Option<i64> {
        self.storage_path_names.get(&name.to_lowercase()).copied()
    }

    pub fn custom_field_id(&self, name: &str) -> Option<i64> {
        self.custom_field_names.get(&name.to_lowercase()).copied()
    }

    /// Like [`tag_id`](Self::tag_id) but an error when absent. The trigger
    /// tag must exist, otherwise the service cannot discover documents.
    pub fn require_tag_id(&self, name: &str) -> Result<i64, ArchiveError> {
        self.tag_id(name).ok_or_else(|| ArchiveError::CacheMiss {
            entity: "tag",
            name: name.to_string(),
        })
    }

    pub fn require_custom_field_id(&self, name: &str) -> Result<i64, ArchiveError> {
        self.custom_field_id(name)
            .ok_or_else(|| ArchiveError::CacheMiss {
                entity: "custom field",
                name: name.to_string(),
            })
    }

    // ── Candidate maps for fuzzy matching ───────────────────

    pub fn correspondent_candidates(&self) -> &HashMap<String, i64> {
        &self.correspondent_names
    }

    pub fn document_type_candidates(&self) -> &HashMap<String, i64> {
        &self.document_type_names
    }

    pub fn tag_candidates(&self) -> &HashMap<String, i64> {
        &self.tag_names
    }

    pub fn storage_path_candidates(&self) -> &HashMap<String, i64> {
        &self.storage_path_names
    }

    // ── Select option lookup ────────────────────────────────

    pub fn select_option_id(&self, field_id: i64, label: &str) -> Option<String> {
        self.custom_fields
            .get(&field_id)?
            .option_id_by_label(label)
    }

    pub fn select_option_label(&self, field_id: i64, option_id: &str) -> Option<String> {
        self.custom_fields
            .get(&field_id)?
            .option_label_by_id(option_id)
    }

    pub fn require_select_option_id(
        &self,
        field_id: i64,
        label: &str,
    ) -> Result<String, ArchiveError> {
        self.select_option_id(field_id, label)
            .ok_or_else(|| ArchiveError::CacheMiss {
                entity: "select option",
                name: label.to_string(),
            })
    }

    // ── Name lists for the system prompt ────────────────────

    pub fn correspondent_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.correspondents.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn document_type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.document_types.values().map(|d| d.name.clone()).collect();
        names.sort();
        names
    }

    pub fn tag_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tags.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    pub fn storage_path_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.storage_paths.values().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    pub fn select_option_labels(&self, field_id: i64) -> Vec<String> {
        self.custom_fields
            .get(&field_id)
            .map(|f| f.select_options().into_iter().map(|o| o.label).collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            correspondents: self.correspondents.len(),
            document_types: self.document_types.len(),
            tags: self.tags.len(),
            storage_paths: self.storage_paths.len(),
            custom_fields: self.custom_fields.len(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_cache;
    use super::*;

    #[test]
    fn empty_cache_is_not_loaded() {
        assert!(!EntityCache::new().is_loaded());
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let cache = sample_cache();
        assert_eq!(cache.correspondent_id("city utilities"), Some(1));
        assert_eq!(cache.correspondent_id("CITY UTILITIES"), Some(1));
        assert_eq!(cache.tag_id("inbox"), Some(12));
        assert!(cache.correspondent_id("Unknown Corp").is_none());
    }

    #[test]
    fn require_tag_id_errors_on_miss() {
        let cache = sample_cache();
        let err = cache.require_tag_id("Nonexistent").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::CacheMiss { entity: "tag", .. }
        ));
    }

    #[test]
    fn select_option_roundtrip() {
        let cache = sample_cache();
        let id = cache.select_option_id(8, "review").unwrap();
        assert_eq!(id, "optReview");
        assert_eq!(cache.select_option_label(8, &id).as_deref(), Some("review"));
        assert!(cache.select_option_id(8, "unknown").is_none());
        assert!(cache.select_option_id(99, "review").is_none());
    }

    #[test]
    fn select_option_label_match_ignores_case() {
        let cache = sample_cache();
        assert_eq!(cache.select_option_id(7, "max").as_deref(), Some("optMax"));
    }

    #[test]
    fn name_lists_are_sorted() {
        let cache = sample_cache();
        assert_eq!(
            cache.document_type_names(),
            vec!["Medical Report".to_string(), "Utility Bill".to_string()]
        );
    }

    #[test]
    fn stats_count_each_category() {
        let cache = sample_cache();
        let stats = cache.stats();
        assert_eq!(stats.correspondents, 2);
        assert_eq!(stats.tags, 3);
        assert_eq!(stats.custom_fields, 5);
        assert!(cache.is_loaded());
    }
}
