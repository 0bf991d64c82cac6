//! Resolver — turns a proposal's names into archive identifiers.
//!
//! Matching policy per name: exact case-insensitive lookup first, then
//! the best fuzzy candidate, accepted only at similarity ≥ 0.85. Names
//! that stay unmatched become create-candidates and count against
//! confidence; they are never written as raw text.
//!
//! The workflow trigger tag is a pipeline-internal signal, not a
//! classification output: it is discarded by name before matching and
//! filtered by id afterwards, so it can never inflate or deflate the
//! resolution counts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::archive::cache::EntityCache;
use crate::classifier::WorkflowFields;
use crate::reasoning::proposal::{ClassificationProposal, NewStoragePath};

/// Minimum normalized similarity for a fuzzy match.
/// 0.85 absorbs typical drift ("Dr Hansen" vs. "Dr. Hansen") without
/// conflating distinct names.
pub const FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    NotFound,
}

/// Outcome of resolving one name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Name as proposed.
    pub name: String,
    pub id: Option<i64>,
    pub kind: MatchKind,
    /// Similarity of the accepted (or best rejected) candidate.
    pub score: f64,
    /// Cache name the fuzzy match landed on (empty for exact/none).
    pub matched_name: String,
}

impl FieldMatch {
    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }
}

/// One resolved custom field value, already in archive-native form
/// (select option id, integer, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedCustomField {
    pub field_id: i64,
    pub value: serde_json::Value,
    /// Human-readable label as proposed, for the review surface.
    pub label: String,
}

/// Entities to create, pending a human decision. Merged from the
/// proposal's own suggestions and every named-but-unmatched field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCandidates {
    pub correspondents: Vec<String>,
    pub document_types: Vec<String>,
    pub tags: Vec<String>,
    pub storage_paths: Vec<NewStoragePath>,
}

impl CreateCandidates {
    pub fn is_empty(&self) -> bool {
        self.correspondents.is_empty()
            && self.document_types.is_empty()
            && self.tags.is_empty()
            && self.storage_paths.is_empty()
    }
}

/// Fully resolved classification with the bookkeeping the confidence
/// evaluator needs. Resolving the same proposal against an unchanged
/// cache is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedClassification {
    pub title: String,
    pub date: Option<String>,

    pub correspondent_id: Option<i64>,
    pub document_type_id: Option<i64>,
    pub storage_path_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub custom_fields: Vec<ResolvedCustomField>,

    /// Matches for core fields the proposal actually named.
    pub core_matches: Vec<FieldMatch>,
    pub tag_matches: Vec<FieldMatch>,

    /// Core fields the proposal left null (explicit "no opinion").
    pub null_field_count: usize,
    /// Names that matched nothing, with their field kind ("correspondent: X").
    pub unresolved_names: Vec<String>,
    pub create_candidates: CreateCandidates,

    /// House-folder fields were supplied but dropped by the structural
    /// guard (digital document or pagination stamp present).
    pub house_folder_dropped: bool,
}

impl ResolvedClassification {
    /// Fields the proposal named (core + tags, trigger tag excluded).
    pub fn named_field_count(&self) -> usize {
        self.core_matches.len() + self.tag_matches.len()
    }

    pub fn resolved_field_count(&self) -> usize {
        self.core_matches
            .iter()
            .chain(&self.tag_matches)
            .filter(|m| m.is_resolved())
            .count()
    }

    pub fn has_fuzzy_matches(&self) -> bool {
        self.core_matches
            .iter()
            .chain(&self.tag_matches)
            .any(|m| m.kind == MatchKind::Fuzzy)
    }

    /// Mean similarity over fuzzy-resolved fields (1.0 when none).
    pub fn mean_fuzzy_score(&self) -> f64 {
        let fuzzy: Vec<f64> = self
            .core_matches
            .iter()
            .chain(&self.tag_matches)
            .filter(|m| m.kind == MatchKind::Fuzzy)
            .map(|m| m.score)
            .collect();
        if fuzzy.is_empty() {
            1.0
        } else {
            fuzzy.iter().sum::<f64>() / fuzzy.len() as f64
        }
    }
}

// ──────────────────────────────────────────────
// Matching
// ──────────────────────────────────────────────

/// Best match for a name in a lowercase-name→id map.
///
/// Ties on similarity break toward the lexicographically smaller
/// candidate so resolution stays deterministic.
fn match_name(name: &str, candidates: &HashMap<String, i64>) -> FieldMatch {
    let lower = name.to_lowercase();

    if let Some(&id) = candidates.get(&lower) {
        return FieldMatch {
            name: name.to_string(),
            id: Some(id),
            kind: MatchKind::Exact,
            score: 1.0,
            matched_name: String::new(),
        };
    }

    let mut best_score = 0.0_f64;
    let mut best_name = "";
    let mut best_id: Option<i64> = None;
    for (candidate, &id) in candidates {
        let score = strsim::normalized_levenshtein(&lower, candidate);
        let better = score > best_score
            || (score == best_score && best_id.is_some() && candidate.as_str() < best_name);
        if better {
            best_score = score;
            best_name = candidate;
            best_id = Some(id);
        }
    }

    if best_score >= FUZZY_THRESHOLD {
        if let Some(id) = best_id {
            tracing::info!(name, matched = best_name, score = best_score, "fuzzy match");
            return FieldMatch {
                name: name.to_string(),
                id: Some(id),
                kind: MatchKind::Fuzzy,
                score: best_score,
                matched_name: best_name.to_string(),
            };
        }
    }

    tracing::warn!(
        name,
        best_candidate = best_name,
        score = best_score,
        "name not resolved"
    );
    FieldMatch {
        name: name.to_string(),
        id: None,
        kind: MatchKind::NotFound,
        score: best_score,
        matched_name: best_name.to_string(),
    }
}

// ──────────────────────────────────────────────
// Resolution
// ──────────────────────────────────────────────

/// Resolve a proposal's names into archive identifiers.
pub fn resolve_proposal(
    proposal: &ClassificationProposal,
    cache: &EntityCache,
    fields: &WorkflowFields,
) -> ResolvedClassification {
    let mut resolved = ResolvedClassification {
        title: proposal.title.clone(),
        date: proposal.date.clone(),
        correspondent_id: None,
        document_type_id: None,
        storage_path_id: None,
        tag_ids: Vec::new(),
        custom_fields: Vec::new(),
        core_matches: Vec::new(),
        tag_matches: Vec::new(),
        null_field_count: 0,
        unresolved_names: Vec::new(),
        create_candidates: CreateCandidates::default(),
        house_folder_dropped: false,
    };

    // Proposal-suggested creations come first; unmatched names merge in below.
    if let Some(create) = &proposal.create_new {
        resolved.create_candidates.correspondents = create.correspondents.clone();
        resolved.create_candidates.document_types = create.document_types.clone();
        resolved.create_candidates.tags = create.tags.clone();
        resolved.create_candidates.storage_paths = create.storage_paths.clone();
    }

    // ── Core fields ─────────────────────────────────────────

    resolved.correspondent_id = resolve_core(
        proposal.correspondent.as_deref(),
        "correspondent",
        cache.correspondent_candidates(),
        &mut resolved.core_matches,
        &mut resolved.null_field_count,
        &mut resolved.unresolved_names,
        &mut resolved.create_candidates.correspondents,
    );
    resolved.document_type_id = resolve_core(
        proposal.document_type.as_deref(),
        "document type",
        cache.document_type_candidates(),
        &mut resolved.core_matches,
        &mut resolved.null_field_count,
        &mut resolved.unresolved_names,
        &mut resolved.create_candidates.document_types,
    );
    resolved.storage_path_id = {
        // Storage-path create candidates carry a path template, so the
        // merge differs from the plain-name kinds.
        let mut names: Vec<String> = Vec::new();
        let id = resolve_core(
            proposal.storage_path.as_deref(),
            "storage path",
            cache.storage_path_candidates(),
            &mut resolved.core_matches,
            &mut resolved.null_field_count,
            &mut resolved.unresolved_names,
            &mut names,
        );
        for name in names {
            let already = resolved
                .create_candidates
                .storage_paths
                .iter()
                .any(|sp| sp.name.eq_ignore_ascii_case(&name));
            if !already {
                resolved.create_candidates.storage_paths.push(NewStoragePath {
                    name,
                    path_template: String::new(),
                });
            }
        }
        id
    };

    // ── Tags ────────────────────────────────────────────────

    for tag_name in &proposal.tags {
        if tag_name.eq_ignore_ascii_case(&fields.trigger_tag_name) {
            tracing::debug!(tag = %tag_name, "trigger tag discarded from proposal");
            continue;
        }
        let matched = match_name(tag_name, cache.tag_candidates());
        if let Some(id) = matched.id {
            if !resolved.tag_ids.contains(&id) {
                resolved.tag_ids.push(id);
            }
        } else {
            resolved.unresolved_names.push(format!("tag: {tag_name}"));
            push_unique(&mut resolved.create_candidates.tags, tag_name);
        }
        resolved.tag_matches.push(matched);
    }

    // ── Tax tag derivation ──────────────────────────────────
    // A missing tax tag is logged but deliberately NOT added to the
    // create candidates; see the design notes.
    if proposal.tax_relevant {
        if let Some(year) = proposal.tax_year {
            let tax_tag = format!("Tax {year}");
            match cache.tag_id(&tax_tag) {
                Some(id) => {
                    if !resolved.tag_ids.contains(&id) {
                        resolved.tag_ids.push(id);
                        resolved.tag_matches.push(FieldMatch {
                            name: tax_tag.clone(),
                            id: Some(id),
                            kind: MatchKind::Exact,
                            score: 1.0,
                            matched_name: String::new(),
                        });
                        tracing::info!(tag = %tax_tag, id, "tax tag derived");
                    }
                }
                None => {
                    tracing::info!(tag = %tax_tag, "derived tax tag does not exist in the archive");
                }
            }
        }
    }

    // The trigger tag must never appear in the output, even if a fuzzy
    // match landed on it.
    resolved.tag_ids.retain(|&id| id != fields.trigger_tag_id);

    // ── Custom fields ───────────────────────────────────────

    if let (Some(person), Some(field_id)) = (&proposal.person, fields.person_field_id) {
        match cache.select_option_id(field_id, person) {
            Some(option_id) => resolved.custom_fields.push(ResolvedCustomField {
                field_id,
                value: serde_json::Value::String(option_id),
                label: person.clone(),
            }),
            None => {
                tracing::warn!(person = %person, field_id, "person not among select options");
            }
        }
    }

    if let (Some(stamp), Some(field_id)) = (proposal.pagination_stamp, fields.pagination_field_id)
    {
        resolved.custom_fields.push(ResolvedCustomField {
            field_id,
            value: serde_json::Value::from(stamp),
            label: stamp.to_string(),
        });
    }

    // ── House folder guard ──────────────────────────────────
    // Physical-filing metadata only applies to documents that physically
    // exist: a scan without a pagination stamp. Anything else the
    // proposal supplied is dropped here, regardless of its own flags.
    let house_supplied =
        proposal.is_house_folder_candidate && proposal.house_register.is_some();
    let house_allowed = proposal.is_scanned_document && proposal.pagination_stamp.is_none();
    if house_supplied && house_allowed {
        if let (Some(register), Some(field_id)) =
            (&proposal.house_register, fields.house_register_field_id)
        {
            match cache.select_option_id(field_id, register) {
                Some(option_id) => {
                    resolved.custom_fields.push(ResolvedCustomField {
                        field_id,
                        value: serde_json::Value::String(option_id),
                        label: register.clone(),
                    });
                    if let (Some(sequence), Some(seq_field_id)) =
                        (proposal.house_sequence, fields.house_sequence_field_id)
                    {
                        resolved.custom_fields.push(ResolvedCustomField {
                            field_id: seq_field_id,
                            value: serde_json::Value::from(sequence),
                            label: sequence.to_string(),
                        });
                    }
                }
                None => {
                    tracing::warn!(register = %register, "house register not among select options");
                }
            }
        }
    } else if house_supplied {
        resolved.house_folder_dropped = true;
        tracing::info!(
            document_is_scan = proposal.is_scanned_document,
            has_stamp = proposal.pagination_stamp.is_some(),
            "house folder fields dropped by structural guard"
        );
    }

    tracing::info!(
        resolved = resolved.resolved_field_count(),
        named = resolved.named_field_count(),
        null_fields = resolved.null_field_count,
        unresolved = resolved.unresolved_names.len(),
        "resolution complete"
    );

    resolved
}

#[allow(clippy::too_many_arguments)]
fn resolve_core(
    value: Option<&str>,
    kind: &str,
    candidates: &HashMap<String, i64>,
    core_matches: &mut Vec<FieldMatch>,
    null_field_count: &mut usize,
    unresolved_names: &mut Vec<String>,
    create_candidates: &mut Vec<String>,
) -> Option<i64> {
    let Some(name) = value else {
        *null_field_count += 1;
        return None;
    };
    let matched = match_name(name, candidates);
    let id = matched.id;
    if id.is_none() {
        unresolved_names.push(format!("{kind}: {name}"));
        push_unique(create_candidates, name);
    }
    core_matches.push(matched);
    id
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::cache::test_support::sample_cache;
    use crate::classifier::test_support::sample_fields;
    use crate::reasoning::proposal::ClassificationProposal;

    fn proposal(json: &str) -> ClassificationProposal {
        ClassificationProposal::parse(json).unwrap()
    }

    #[test]
    fn exact_match_resolves_core_fields() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"correspondent": "city utilities", "document_type": "Utility Bill",
                    "storage_path": "Household"}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.correspondent_id, Some(1));
        assert_eq!(resolved.document_type_id, Some(4));
        assert_eq!(resolved.storage_path_id, Some(7));
        assert_eq!(resolved.null_field_count, 0);
        assert_eq!(resolved.named_field_count(), 3);
        assert_eq!(resolved.resolved_field_count(), 3);
        assert!(!resolved.has_fuzzy_matches());
    }

    #[test]
    fn fuzzy_match_above_threshold_accepted() {
        // "Dr Hansen" vs cached "Dr. Hansen": one punctuation character off
        let resolved = resolve_proposal(
            &proposal(r#"{"correspondent": "Dr Hansen"}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.correspondent_id, Some(2));
        assert!(resolved.has_fuzzy_matches());
        assert_eq!(resolved.core_matches[0].kind, MatchKind::Fuzzy);
        assert!(resolved.core_matches[0].score >= FUZZY_THRESHOLD);
        assert_eq!(resolved.core_matches[0].matched_name, "dr. hansen");
    }

    #[test]
    fn distant_name_becomes_create_candidate() {
        let resolved = resolve_proposal(
            &proposal(r#"{"correspondent": "Completely Different Inc"}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(resolved.correspondent_id.is_none());
        assert_eq!(resolved.null_field_count, 0);
        assert_eq!(
            resolved.unresolved_names,
            vec!["correspondent: Completely Different Inc"]
        );
        assert_eq!(
            resolved.create_candidates.correspondents,
            vec!["Completely Different Inc"]
        );
    }

    #[test]
    fn null_core_fields_counted() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"correspondent": null, "document_type": "Utility Bill", "storage_path": null}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.null_field_count, 2);
        assert_eq!(resolved.named_field_count(), 1);
        assert_eq!(resolved.resolved_field_count(), 1);
    }

    #[test]
    fn trigger_tag_discarded_even_when_named() {
        let resolved = resolve_proposal(
            &proposal(r#"{"tags": ["Inbox", "Insurance"]}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.tag_ids, vec![20]);
        // The discarded trigger tag does not show up in the counts either
        assert_eq!(resolved.named_field_count(), 1);
        assert!(!resolved
            .unresolved_names
            .iter()
            .any(|n| n.to_lowercase().contains("inbox")));
    }

    #[test]
    fn trigger_tag_id_never_in_output() {
        // Names close to the trigger tag must not land its id in the
        // resolved tag set through the fuzzy path.
        let resolved = resolve_proposal(
            &proposal(r#"{"tags": ["Inbo"]}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(!resolved.tag_ids.contains(&12));
    }

    #[test]
    fn unknown_tag_tracked_and_deduplicated() {
        let resolved = resolve_proposal(
            &proposal(r#"{"tags": ["Subscriptions", "subscriptions"]}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(resolved.tag_ids.is_empty());
        assert_eq!(resolved.create_candidates.tags, vec!["Subscriptions"]);
        assert_eq!(resolved.unresolved_names.len(), 2);
    }

    #[test]
    fn tax_tag_derived_when_cached() {
        let resolved = resolve_proposal(
            &proposal(r#"{"tax_relevant": true, "tax_year": 2025}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.tag_ids, vec![21]);
    }

    #[test]
    fn missing_tax_tag_is_not_a_create_candidate() {
        let resolved = resolve_proposal(
            &proposal(r#"{"tax_relevant": true, "tax_year": 1999}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(resolved.tag_ids.is_empty());
        assert!(resolved.create_candidates.tags.is_empty());
    }

    #[test]
    fn person_resolves_to_option_id() {
        let resolved = resolve_proposal(
            &proposal(r#"{"person": "Max"}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert_eq!(resolved.custom_fields.len(), 1);
        assert_eq!(resolved.custom_fields[0].field_id, 7);
        assert_eq!(resolved.custom_fields[0].value, serde_json::json!("optMax"));
    }

    #[test]
    fn unknown_person_excluded_from_output() {
        let resolved = resolve_proposal(
            &proposal(r#"{"person": "Stranger"}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(resolved.custom_fields.is_empty());
    }

    #[test]
    fn house_fields_honored_for_clean_scan() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"is_scanned_document": true, "is_house_folder_candidate": true,
                    "house_register": "3", "house_sequence": 14}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        let register = resolved.custom_fields.iter().find(|cf| cf.field_id == 5);
        let sequence = resolved.custom_fields.iter().find(|cf| cf.field_id == 6);
        assert_eq!(register.unwrap().value, serde_json::json!("optReg3"));
        assert_eq!(sequence.unwrap().value, serde_json::json!(14));
        assert!(!resolved.house_folder_dropped);
    }

    #[test]
    fn house_fields_dropped_for_digital_document() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"is_scanned_document": false, "is_house_folder_candidate": true,
                    "house_register": "3"}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(!resolved.custom_fields.iter().any(|cf| cf.field_id == 5));
        assert!(resolved.house_folder_dropped);
    }

    #[test]
    fn house_fields_dropped_when_stamp_present() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"is_scanned_document": true, "is_house_folder_candidate": true,
                    "house_register": "3", "pagination_stamp": 55}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        assert!(!resolved.custom_fields.iter().any(|cf| cf.field_id == 5));
        assert!(resolved.house_folder_dropped);
        // The stamp itself still resolves into the pagination field
        assert!(resolved.custom_fields.iter().any(|cf| cf.field_id == 2));
    }

    #[test]
    fn proposal_create_new_merged_with_unmatched_names() {
        let resolved = resolve_proposal(
            &proposal(
                r#"{"correspondent": "Acme Corp",
                    "create_new": {"correspondents": ["Acme Corp"], "tags": ["Freelance"]}}"#,
            ),
            &sample_cache(),
            &sample_fields(),
        );
        // Unmatched correspondent deduplicates against the proposal's own list
        assert_eq!(resolved.create_candidates.correspondents, vec!["Acme Corp"]);
        assert_eq!(resolved.create_candidates.tags, vec!["Freelance"]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let cache = sample_cache();
        let fields = sample_fields();
        let prop = proposal(
            r#"{"correspondent": "Dr Hansen", "document_type": null,
                "tags": ["Insurance", "Unknown Tag"], "person": "Mona",
                "tax_relevant": true, "tax_year": 2025}"#,
        );
        let first = resolve_proposal(&prop, &cache, &fields);
        let second = resolve_proposal(&prop, &cache, &fields);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn mean_fuzzy_score_defaults_to_one() {
        let resolved = resolve_proposal(
            &proposal(r#"{"correspondent": "City Utilities"}"#),
            &sample_cache(),
            &sample_fields(),
        );
        assert!((resolved.mean_fuzzy_score() - 1.0).abs() < f64::EPSILON);
    }
}
