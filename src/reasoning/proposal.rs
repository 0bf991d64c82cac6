//! Classification proposal — the reasoning service's structured answer
//! for one document.
//!
//! The proposal is immutable once parsed and is persisted verbatim (raw
//! JSON) for audit. Parsing is lenient: every field is optional or has a
//! default so an incomplete answer still yields a usable proposal, and
//! the distinction between "field absent/null" and "field named" is
//! preserved — confidence scoring depends on it.

use serde::{Deserialize, Serialize};

use super::ReasoningError;

/// Discrete confidence level, used both for the proposal's self-estimate
/// and for the final evaluated level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Proposal for a storage path that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStoragePath {
    pub name: String,
    #[serde(default)]
    pub path_template: String,
}

/// Entity names the reasoning service believes are missing from the
/// archive. Surfaced for human-gated creation, never created silently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNew {
    #[serde(default)]
    pub correspondents: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub storage_paths: Vec<NewStoragePath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationProposal {
    // Core classification. `None` means the service explicitly had no
    // opinion, which counts against confidence.
    #[serde(default)]
    pub title: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub storage_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date: Option<String>,

    // Physical-document signals
    #[serde(default)]
    pub is_scanned_document: bool,
    pub pagination_stamp: Option<i64>,
    pub pagination_stamp_confidence: Option<ConfidenceLevel>,

    // House folder (physical filing)
    #[serde(default)]
    pub is_house_folder_candidate: bool,
    pub house_register: Option<String>,
    pub house_sequence: Option<i64>,

    // Person assignment
    pub person: Option<String>,
    pub person_confidence: Option<ConfidenceLevel>,
    pub person_reasoning: Option<String>,

    // Tax relevance → synthesized tag
    #[serde(default)]
    pub tax_relevant: bool,
    pub tax_year: Option<i32>,

    // Overall self-estimate
    #[serde(default = "default_confidence")]
    pub confidence: ConfidenceLevel,
    #[serde(default)]
    pub reasoning: String,

    pub create_new: Option<CreateNew>,
}

fn default_confidence() -> ConfidenceLevel {
    ConfidenceLevel::Low
}

impl ClassificationProposal {
    /// Parse a proposal from the reasoning service's answer text.
    ///
    /// Accepts bare JSON or JSON wrapped in a fenced code block with
    /// surrounding prose.
    pub fn parse(answer: &str) -> Result<Self, ReasoningError> {
        let json = extract_json(answer)?;
        serde_json::from_str(json).map_err(|e| ReasoningError::MalformedResponse(e.to_string()))
    }
}

/// Extract the JSON payload from an answer that may wrap it in a
/// ```json fence or lead with prose.
fn extract_json(answer: &str) -> Result<&str, ReasoningError> {
    let trimmed = answer.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }
    if let Some(fence_start) = trimmed.find("```json") {
        let content_start = fence_start + 7;
        let content_end = trimmed[content_start..].find("```").ok_or_else(|| {
            ReasoningError::MalformedResponse("unclosed JSON code block".into())
        })?;
        return Ok(trimmed[content_start..content_start + content_end].trim());
    }
    // Last resort: first '{' to last '}'
    let start = trimmed
        .find('{')
        .ok_or_else(|| ReasoningError::MalformedResponse("no JSON object in answer".into()))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| ReasoningError::MalformedResponse("no JSON object in answer".into()))?;
    if end <= start {
        return Err(ReasoningError::MalformedResponse(
            "no JSON object in answer".into(),
        ));
    }
    Ok(&trimmed[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let proposal = ClassificationProposal::parse(
            r#"{"title": "Utility bill March", "document_type": "Utility Bill",
                "confidence": "high", "tags": ["Household"]}"#,
        )
        .unwrap();
        assert_eq!(proposal.title, "Utility bill March");
        assert_eq!(proposal.document_type.as_deref(), Some("Utility Bill"));
        assert!(proposal.correspondent.is_none());
        assert_eq!(proposal.confidence, ConfidenceLevel::High);
        assert_eq!(proposal.tags, vec!["Household"]);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let answer = r#"Here is the classification:

```json
{"title": "Letter", "correspondent": "Dr. Hansen", "confidence": "medium"}
```

Let me know if anything is unclear."#;
        let proposal = ClassificationProposal::parse(answer).unwrap();
        assert_eq!(proposal.correspondent.as_deref(), Some("Dr. Hansen"));
        assert_eq!(proposal.confidence, ConfidenceLevel::Medium);
    }

    #[test]
    fn missing_confidence_defaults_to_low() {
        let proposal = ClassificationProposal::parse(r#"{"title": "x"}"#).unwrap();
        assert_eq!(proposal.confidence, ConfidenceLevel::Low);
        assert!(!proposal.is_scanned_document);
        assert!(!proposal.tax_relevant);
    }

    #[test]
    fn explicit_nulls_stay_none() {
        let proposal = ClassificationProposal::parse(
            r#"{"correspondent": null, "document_type": "Invoice", "storage_path": null}"#,
        )
        .unwrap();
        assert!(proposal.correspondent.is_none());
        assert!(proposal.storage_path.is_none());
        assert_eq!(proposal.document_type.as_deref(), Some("Invoice"));
    }

    #[test]
    fn create_new_section_parsed() {
        let proposal = ClassificationProposal::parse(
            r#"{"create_new": {"correspondents": ["Acme Corp"],
                "storage_paths": [{"name": "Work", "path_template": "{{created_year}}/work"}]}}"#,
        )
        .unwrap();
        let create = proposal.create_new.unwrap();
        assert_eq!(create.correspondents, vec!["Acme Corp"]);
        assert_eq!(create.storage_paths[0].name, "Work");
        assert!(create.tags.is_empty());
    }

    #[test]
    fn prose_only_answer_is_malformed() {
        let err = ClassificationProposal::parse("I could not read the document.").unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedResponse(_)));
    }

    #[test]
    fn unclosed_fence_is_malformed() {
        let err = ClassificationProposal::parse("```json\n{\"title\": \"x\"}").unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedResponse(_)));
    }

    #[test]
    fn house_folder_fields_parsed() {
        let proposal = ClassificationProposal::parse(
            r#"{"is_scanned_document": true, "is_house_folder_candidate": true,
                "house_register": "3", "house_sequence": 14, "pagination_stamp": 102,
                "pagination_stamp_confidence": "high"}"#,
        )
        .unwrap();
        assert!(proposal.is_house_folder_candidate);
        assert_eq!(proposal.house_register.as_deref(), Some("3"));
        assert_eq!(proposal.house_sequence, Some(14));
        assert_eq!(proposal.pagination_stamp, Some(102));
    }
}
