//! Confidence evaluation for resolved classifications.
//!
//! Combines four signals into one score in [0, 1]:
//! - the proposal's own confidence estimate (anchored to a numeric value)
//! - the effective mapping ratio, with null core fields in the denominator
//! - fuzzy-match quality (approximate matches score below exact ones)
//! - special-field signals (person / pagination stamp self-reports,
//!   house-folder ambiguity)
//!
//! The weights are tunable policy; the invariants are not: a score at or
//! below the HIGH cutoff is never HIGH, and a proposal with any null core
//! field is never HIGH no matter what the numbers say.

use serde::{Deserialize, Serialize};

use crate::classifier::resolver::ResolvedClassification;
use crate::classifier::PipelineStatus;
use crate::reasoning::proposal::{ClassificationProposal, ConfidenceLevel};

/// Score strictly above this is HIGH. A score exactly on the cutoff
/// resolves to MEDIUM: ties favor caution.
pub const THRESHOLD_HIGH: f64 = 0.80;
/// Score at or above this (and not HIGH) is MEDIUM.
pub const THRESHOLD_MEDIUM: f64 = 0.50;

/// Numeric anchors for self-reported confidence levels.
const ANCHOR_HIGH: f64 = 1.0;
const ANCHOR_MEDIUM: f64 = 0.6;
const ANCHOR_LOW: f64 = 0.2;

/// Neutral special-field score when no special fields are present.
const SPECIAL_NEUTRAL: f64 = 0.7;
/// Penalty component when house-folder fields were dropped by the guard.
const SPECIAL_HOUSE_DROPPED: f64 = 0.3;

fn anchor(level: ConfidenceLevel) -> f64 {
    match level {
        ConfidenceLevel::High => ANCHOR_HIGH,
        ConfidenceLevel::Medium => ANCHOR_MEDIUM,
        ConfidenceLevel::Low => ANCHOR_LOW,
    }
}

/// Signal weights. Should sum to 1.0; exposed as configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub self_report: f64,
    pub mapping: f64,
    pub fuzzy: f64,
    pub special: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            self_report: 0.40,
            mapping: 0.30,
            fuzzy: 0.15,
            special: 0.15,
        }
    }
}

/// What the decision level means for the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Write everything, status "classified".
    AutoApply,
    /// Write everything but flag for human confirmation, status "review".
    ApplyForReview,
    /// Write nothing except bookkeeping, status "review".
    ReviewOnly,
}

impl ApplyPolicy {
    pub fn applies_fields(&self) -> bool {
        matches!(self, Self::AutoApply | Self::ApplyForReview)
    }

    pub fn status(&self) -> PipelineStatus {
        match self {
            Self::AutoApply => PipelineStatus::Classified,
            Self::ApplyForReview | Self::ReviewOnly => PipelineStatus::Review,
        }
    }
}

/// Evaluated confidence with its per-signal breakdown, kept for the
/// outcome record and the review surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub level: ConfidenceLevel,
    pub policy: ApplyPolicy,
    pub score: f64,

    pub self_report_score: f64,
    pub mapping_score: f64,
    pub fuzzy_score: f64,
    pub special_score: f64,

    pub reasons: Vec<String>,
}

/// Evaluate a resolved classification.
pub fn evaluate(
    proposal: &ClassificationProposal,
    resolved: &ResolvedClassification,
    weights: &ConfidenceWeights,
) -> ConfidenceScore {
    let mut reasons = Vec::new();

    // Signal 1: the proposal's own estimate
    let self_report_score = anchor(proposal.confidence);
    reasons.push(format!(
        "self-reported {} ({self_report_score:.1})",
        proposal.confidence.as_str()
    ));

    // Signal 2: effective mapping ratio. Null core fields stay in the
    // denominator, so a proposal that leaves fields undetermined never
    // scores a perfect ratio over a shrunken total.
    let named = resolved.named_field_count();
    let null_fields = resolved.null_field_count;
    let mapping_score = if named + null_fields == 0 {
        1.0
    } else {
        resolved.resolved_field_count() as f64 / (named + null_fields) as f64
    };
    if mapping_score < 1.0 {
        reasons.push(format!(
            "{}/{} named fields resolved, {} null ({:.0}% effective)",
            resolved.resolved_field_count(),
            named,
            null_fields,
            mapping_score * 100.0
        ));
        for name in resolved.unresolved_names.iter().take(3) {
            reasons.push(format!("  unresolved {name}"));
        }
    } else {
        reasons.push("all named fields resolved".into());
    }

    // Signal 3: fuzzy-match quality
    let fuzzy_score = resolved.mean_fuzzy_score();
    if resolved.has_fuzzy_matches() {
        reasons.push(format!("fuzzy matches, mean similarity {fuzzy_score:.2}"));
    }

    // Signal 4: special fields
    let special_score = special_fields_score(proposal, resolved, &mut reasons);

    let score = weights.self_report * self_report_score
        + weights.mapping * mapping_score
        + weights.fuzzy * fuzzy_score
        + weights.special * special_score;

    let (mut level, mut policy) = if score > THRESHOLD_HIGH {
        (ConfidenceLevel::High, ApplyPolicy::AutoApply)
    } else if score >= THRESHOLD_MEDIUM {
        (ConfidenceLevel::Medium, ApplyPolicy::ApplyForReview)
    } else {
        (ConfidenceLevel::Low, ApplyPolicy::ReviewOnly)
    };

    // Hard override: undetermined core fields must always pass a human.
    if null_fields > 0 && level == ConfidenceLevel::High {
        level = ConfidenceLevel::Medium;
        policy = ApplyPolicy::ApplyForReview;
        reasons.push(format!(
            "{null_fields} core field(s) undetermined: downgraded from high to medium"
        ));
    }

    reasons.insert(0, format!("score {score:.2} -> {}", level.as_str()));

    tracing::info!(
        score,
        level = level.as_str(),
        self_report = self_report_score,
        mapping = mapping_score,
        fuzzy = fuzzy_score,
        special = special_score,
        "confidence evaluated"
    );

    ConfidenceScore {
        level,
        policy,
        score,
        self_report_score,
        mapping_score,
        fuzzy_score,
        special_score,
        reasons,
    }
}

/// Person and pagination self-reports, plus the house-folder guard.
/// No special fields present scores a neutral 0.7.
fn special_fields_score(
    proposal: &ClassificationProposal,
    resolved: &ResolvedClassification,
    reasons: &mut Vec<String>,
) -> f64 {
    let mut scores = Vec::new();

    if let Some(person) = &proposal.person {
        let score = proposal
            .person_confidence
            .map(anchor)
            .unwrap_or(ANCHOR_MEDIUM);
        if score < ANCHOR_MEDIUM {
            reasons.push(format!(
                "person '{person}' uncertain ({})",
                proposal
                    .person_reasoning
                    .as_deref()
                    .unwrap_or("no rationale given")
            ));
        }
        scores.push(score);
    }

    if let Some(stamp) = proposal.pagination_stamp {
        let score = proposal
            .pagination_stamp_confidence
            .map(anchor)
            .unwrap_or(ANCHOR_MEDIUM);
        if score < ANCHOR_MEDIUM {
            reasons.push(format!("pagination stamp {stamp} uncertain"));
        }
        scores.push(score);
    }

    if resolved.house_folder_dropped {
        reasons.push("house folder fields contradicted the document structure".into());
        scores.push(SPECIAL_HOUSE_DROPPED);
    }

    if scores.is_empty() {
        SPECIAL_NEUTRAL
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::cache::test_support::sample_cache;
    use crate::classifier::resolver::resolve_proposal;
    use crate::classifier::test_support::sample_fields;

    fn evaluate_json(json: &str) -> ConfidenceScore {
        let proposal = ClassificationProposal::parse(json).unwrap();
        let resolved = resolve_proposal(&proposal, &sample_cache(), &sample_fields());
        evaluate(&proposal, &resolved, &ConfidenceWeights::default())
    }

    #[test]
    fn fully_resolved_high_proposal_auto_applies() {
        let score = evaluate_json(
            r#"{"correspondent": "City Utilities", "document_type": "Utility Bill",
                "storage_path": "Household", "confidence": "high"}"#,
        );
        assert_eq!(score.level, ConfidenceLevel::High);
        assert_eq!(score.policy, ApplyPolicy::AutoApply);
        assert!(score.policy.applies_fields());
        assert_eq!(score.policy.status(), PipelineStatus::Classified);
    }

    #[test]
    fn null_fields_forbid_high_despite_high_self_report() {
        // Named 1, resolved 1, null 2 → effective ratio 1/3
        let score = evaluate_json(
            r#"{"correspondent": null, "document_type": "Utility Bill",
                "storage_path": null, "confidence": "high"}"#,
        );
        assert!((score.mapping_score - 1.0 / 3.0).abs() < 1e-9);
        assert_ne!(score.level, ConfidenceLevel::High);
    }

    #[test]
    fn null_override_downgrades_even_a_winning_score() {
        // Force the weighted formula above the HIGH cutoff while a core
        // field stays null: the override must still demote to MEDIUM.
        let weights = ConfidenceWeights {
            self_report: 1.0,
            mapping: 0.0,
            fuzzy: 0.0,
            special: 0.0,
        };
        let proposal = ClassificationProposal::parse(
            r#"{"correspondent": null, "document_type": "Utility Bill",
                "storage_path": "Household", "confidence": "high"}"#,
        )
        .unwrap();
        let resolved = resolve_proposal(&proposal, &sample_cache(), &sample_fields());
        let score = evaluate(&proposal, &resolved, &weights);
        assert!(score.score > THRESHOLD_HIGH);
        assert_eq!(score.level, ConfidenceLevel::Medium);
        assert_eq!(score.policy, ApplyPolicy::ApplyForReview);
    }

    #[test]
    fn score_exactly_on_high_cutoff_is_medium() {
        let weights = ConfidenceWeights {
            self_report: 0.80,
            mapping: 0.0,
            fuzzy: 0.0,
            special: 0.0,
        };
        let proposal = ClassificationProposal::parse(
            r#"{"correspondent": "City Utilities", "document_type": "Utility Bill",
                "storage_path": "Household", "confidence": "high"}"#,
        )
        .unwrap();
        let resolved = resolve_proposal(&proposal, &sample_cache(), &sample_fields());
        let score = evaluate(&proposal, &resolved, &weights);
        assert!((score.score - THRESHOLD_HIGH).abs() < 1e-12);
        assert_eq!(score.level, ConfidenceLevel::Medium);
    }

    #[test]
    fn low_self_report_with_nothing_resolved_is_low() {
        let score = evaluate_json(r#"{"correspondent": "Totally Unknown", "confidence": "low"}"#);
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert_eq!(score.policy, ApplyPolicy::ReviewOnly);
        assert!(!score.policy.applies_fields());
        assert_eq!(score.policy.status(), PipelineStatus::Review);
    }

    #[test]
    fn more_null_fields_never_increase_the_score() {
        let none_null = evaluate_json(
            r#"{"correspondent": "City Utilities", "document_type": "Utility Bill",
                "storage_path": "Household", "confidence": "medium"}"#,
        );
        let one_null = evaluate_json(
            r#"{"correspondent": "City Utilities", "document_type": "Utility Bill",
                "storage_path": null, "confidence": "medium"}"#,
        );
        let two_null = evaluate_json(
            r#"{"correspondent": "City Utilities", "document_type": null,
                "storage_path": null, "confidence": "medium"}"#,
        );
        assert!(one_null.score <= none_null.score);
        assert!(two_null.score <= one_null.score);
        assert!(two_null.mapping_score < one_null.mapping_score);
    }

    #[test]
    fn mapping_ratio_never_exceeds_one() {
        let score = evaluate_json(r#"{"tags": ["Insurance"], "confidence": "high"}"#);
        assert!(score.mapping_score <= 1.0);
    }

    #[test]
    fn fuzzy_matches_score_below_exact() {
        let exact = evaluate_json(r#"{"correspondent": "Dr. Hansen", "confidence": "medium"}"#);
        let fuzzy = evaluate_json(r#"{"correspondent": "Dr Hansen", "confidence": "medium"}"#);
        assert!(fuzzy.fuzzy_score < exact.fuzzy_score);
        assert!(fuzzy.score < exact.score);
    }

    #[test]
    fn uncertain_person_lowers_special_signal() {
        let confident = evaluate_json(
            r#"{"person": "Max", "person_confidence": "high", "confidence": "medium"}"#,
        );
        let uncertain = evaluate_json(
            r#"{"person": "Max", "person_confidence": "low", "confidence": "medium"}"#,
        );
        assert!(uncertain.special_score < confident.special_score);
    }

    #[test]
    fn dropped_house_fields_penalize_special_signal() {
        let clean = evaluate_json(r#"{"confidence": "medium"}"#);
        let contradictory = evaluate_json(
            r#"{"is_scanned_document": false, "is_house_folder_candidate": true,
                "house_register": "3", "confidence": "medium"}"#,
        );
        assert!(contradictory.special_score < clean.special_score);
    }

    #[test]
    fn empty_proposal_has_zero_mapping_ratio() {
        // All three core fields null: the denominator still counts them.
        let score = evaluate_json(r#"{"confidence": "medium"}"#);
        assert_eq!(score.mapping_score, 0.0);
    }

    #[test]
    fn tags_only_proposal_still_pays_for_null_core_fields() {
        // One resolved tag over (1 named + 3 null) = 0.25
        let score = evaluate_json(r#"{"tags": ["Insurance"], "confidence": "high"}"#);
        assert!((score.mapping_score - 0.25).abs() < 1e-9);
    }
}
