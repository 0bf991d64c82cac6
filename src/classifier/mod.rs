//! Classification core: name resolution, confidence scoring, model
//! routing and the per-document pipeline.

pub mod confidence;
pub mod pipeline;
pub mod resolver;
pub mod router;

use serde::{Deserialize, Serialize};

use crate::archive::cache::EntityCache;
use crate::archive::ArchiveError;
use crate::config::Settings;

/// Pipeline status values recorded in the archive's status custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Applied automatically with high confidence.
    Classified,
    /// Waiting for (or flagged for) human review.
    Review,
    /// Permanent processing failure; inspect the outcome record.
    Error,
    /// A human applied (possibly edited) fields through the review surface.
    Manual,
    /// Deliberately left unprocessed.
    Skipped,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classified => "classified",
            Self::Review => "review",
            Self::Error => "error",
            Self::Manual => "manual",
            Self::Skipped => "skipped",
        }
    }
}

/// Archive ids of the workflow vocabulary (trigger tag, status field,
/// special custom fields), resolved from configured names once per cache
/// load. The trigger tag and status field must exist; the special fields
/// are optional archive features.
#[derive(Debug, Clone)]
pub struct WorkflowFields {
    pub trigger_tag_id: i64,
    pub trigger_tag_name: String,
    pub status_field_id: i64,
    pub person_field_id: Option<i64>,
    pub pagination_field_id: Option<i64>,
    pub house_register_field_id: Option<i64>,
    pub house_sequence_field_id: Option<i64>,
}

impl WorkflowFields {
    pub fn from_cache(cache: &EntityCache, settings: &Settings) -> Result<Self, ArchiveError> {
        Ok(Self {
            trigger_tag_id: cache.require_tag_id(&settings.trigger_tag)?,
            trigger_tag_name: settings.trigger_tag.clone(),
            status_field_id: cache.require_custom_field_id(&settings.status_field)?,
            person_field_id: cache.custom_field_id(&settings.person_field),
            pagination_field_id: cache.custom_field_id(&settings.pagination_field),
            house_register_field_id: cache.custom_field_id(&settings.house_register_field),
            house_sequence_field_id: cache.custom_field_id(&settings.house_sequence_field),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::*;
    use crate::archive::cache::test_support::sample_cache;

    pub fn sample_settings() -> Settings {
        let vars: HashMap<String, String> = HashMap::from([
            ("ARCHIVIST_ARCHIVE_URL".into(), "http://archive.local".into()),
            ("ARCHIVIST_ARCHIVE_TOKEN".into(), "token".into()),
            ("ARCHIVIST_API_KEY".into(), "sk-test".into()),
        ]);
        Settings::from_map(&vars).expect("sample settings")
    }

    pub fn sample_fields() -> WorkflowFields {
        WorkflowFields::from_cache(&sample_cache(), &sample_settings())
            .expect("sample cache carries the workflow vocabulary")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{sample_fields, sample_settings};
    use super::*;
    use crate::archive::cache::EntityCache;

    #[test]
    fn status_strings_match_archive_vocabulary() {
        assert_eq!(PipelineStatus::Classified.as_str(), "classified");
        assert_eq!(PipelineStatus::Review.as_str(), "review");
        assert_eq!(PipelineStatus::Error.as_str(), "error");
        assert_eq!(PipelineStatus::Manual.as_str(), "manual");
        assert_eq!(PipelineStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn workflow_fields_resolved_from_cache() {
        let fields = sample_fields();
        assert_eq!(fields.trigger_tag_id, 12);
        assert_eq!(fields.status_field_id, 8);
        assert_eq!(fields.person_field_id, Some(7));
        assert_eq!(fields.pagination_field_id, Some(2));
        assert_eq!(fields.house_register_field_id, Some(5));
        assert_eq!(fields.house_sequence_field_id, Some(6));
    }

    #[test]
    fn missing_trigger_tag_is_an_error() {
        let cache = EntityCache::new();
        let err = WorkflowFields::from_cache(&cache, &sample_settings()).unwrap_err();
        assert!(matches!(err, ArchiveError::CacheMiss { .. }));
    }
}
