//! Typed models for the archive REST API.
//!
//! Only fields the classifier needs are modeled; unknown fields are
//! ignored on deserialization for forward compatibility.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Entities
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correspondent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub document_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub document_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_inbox_tag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePath {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// One option of a select custom field. Option ids are server-generated
/// opaque strings; setting a select value requires the id, not the label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: i64,
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub extra_data: serde_json::Value,
}

impl CustomFieldDefinition {
    /// Select options for a select field (empty for any other type).
    pub fn select_options(&self) -> Vec<SelectOption> {
        if self.data_type != "select" {
            return Vec::new();
        }
        self.extra_data
            .get("select_options")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|opt| serde_json::from_value(opt.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn option_id_by_label(&self, label: &str) -> Option<String> {
        self.select_options()
            .into_iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
            .map(|o| o.id)
    }

    pub fn option_label_by_id(&self, option_id: &str) -> Option<String> {
        self.select_options()
            .into_iter()
            .find(|o| o.id == option_id)
            .map(|o| o.label)
    }
}

// ──────────────────────────────────────────────
// Documents
// ──────────────────────────────────────────────

/// Custom field value as attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub field: i64,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub correspondent: Option<i64>,
    pub document_type: Option<i64>,
    pub storage_path: Option<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
    pub created_date: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl Document {
    /// Value of a custom field on this document, if set and non-null.
    pub fn custom_field_value(&self, field_id: i64) -> Option<&serde_json::Value> {
        self.custom_fields
            .iter()
            .find(|cf| cf.field == field_id)
            .map(|cf| &cf.value)
            .filter(|v| !v.is_null())
    }
}

/// Single-request document update.
///
/// Metadata fields are double-optional: `None` leaves the field out of
/// the request entirely, `Some(None)` sends an explicit `null` (clearing
/// an archive-side auto-matched value). Tags and custom fields are always
/// sent as the complete new set, never as increments: one PATCH carries
/// every change together.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomFieldValue>>,
}

/// Generic paginated list response from the archive API.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_options_parsed_from_extra_data() {
        let field = CustomFieldDefinition {
            id: 7,
            name: "Person".into(),
            data_type: "select".into(),
            extra_data: json!({
                "select_options": [
                    {"id": "aB3xY", "label": "Max"},
                    {"id": "Qw9Zz", "label": "Mona"},
                ]
            }),
        };
        assert_eq!(field.select_options().len(), 2);
        assert_eq!(field.option_id_by_label("max").as_deref(), Some("aB3xY"));
        assert_eq!(field.option_label_by_id("Qw9Zz").as_deref(), Some("Mona"));
        assert!(field.option_id_by_label("Nobody").is_none());
    }

    #[test]
    fn non_select_field_has_no_options() {
        let field = CustomFieldDefinition {
            id: 2,
            name: "Pagination".into(),
            data_type: "integer".into(),
            extra_data: json!({}),
        };
        assert!(field.select_options().is_empty());
    }

    #[test]
    fn patch_skips_absent_fields_and_sends_explicit_nulls() {
        let patch = DocumentPatch {
            correspondent: Some(None),
            document_type: Some(Some(4)),
            tags: Some(vec![1, 3]),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["correspondent"], serde_json::Value::Null);
        assert_eq!(json["document_type"], json!(4));
        assert_eq!(json["tags"], json!([1, 3]));
        // Absent fields must not appear at all
        assert!(json.get("storage_path").is_none());
        assert!(json.get("title").is_none());
        assert!(json.get("custom_fields").is_none());
    }

    #[test]
    fn custom_field_value_ignores_nulls() {
        let doc = Document {
            id: 1,
            title: "Invoice".into(),
            correspondent: None,
            document_type: None,
            storage_path: None,
            tags: vec![],
            created_date: None,
            custom_fields: vec![
                CustomFieldValue {
                    field: 8,
                    value: serde_json::Value::Null,
                },
                CustomFieldValue {
                    field: 2,
                    value: json!(17),
                },
            ],
        };
        assert!(doc.custom_field_value(8).is_none());
        assert_eq!(doc.custom_field_value(2), Some(&json!(17)));
        assert!(doc.custom_field_value(99).is_none());
    }

    #[test]
    fn document_deserializes_with_unknown_fields() {
        let doc: Document = serde_json::from_value(json!({
            "id": 42,
            "title": "Letter",
            "correspondent": 3,
            "document_type": null,
            "storage_path": null,
            "tags": [12],
            "created_date": "2026-01-15",
            "custom_fields": [],
            "archive_serial_number": 991,
            "owner": 1
        }))
        .unwrap();
        assert_eq!(doc.id, 42);
        assert_eq!(doc.correspondent, Some(3));
        assert!(doc.document_type.is_none());
    }
}
