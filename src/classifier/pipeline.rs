//! Per-document pipeline: route → classify → resolve → score → apply.
//!
//! One document runs end-to-end before the next starts; the only
//! suspension points are the blocking collaborator calls. The archive is
//! written at most once per attempt, through a single PATCH that carries
//! metadata, the full tag set and all custom field values together —
//! sequential partial updates let a concurrent reader resurrect stale
//! tag state, which shows up as reprocessing loops.
//!
//! Failure handling:
//! - transient reasoning overload: no archive write, no outcome record,
//!   the whole cycle aborts and the document retries next cycle
//! - permanent failures: status "error" + trigger removal in one
//!   best-effort PATCH, outcome recorded
//! - unsupported originals (not a PDF): status "skipped" instead of
//!   "error", no reasoning call spent
//! - archive write failure: logged, document stays in its pre-attempt
//!   state, outcome recorded as error

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Instant;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::archive::cache::EntityCache;
use crate::archive::client::ArchiveClient;
use crate::archive::models::{CustomFieldValue, Document, DocumentPatch};
use crate::archive::ArchiveError;
use crate::classifier::confidence::{evaluate, ConfidenceScore};
use crate::classifier::resolver::{resolve_proposal, ResolvedClassification};
use crate::classifier::router::{analyze_pdf, select_tier, ModelTier, PdfTraits, RoutingDecision};
use crate::classifier::{PipelineStatus, WorkflowFields};
use crate::config::Settings;
use crate::db::repository::{insert_outcome, OutcomeRecord};
use crate::reasoning::client::{ClassifyResponse, ReasoningClient, TokenUsage};
use crate::reasoning::prompt::{build_system_prompt, PromptData};
use crate::reasoning::ReasoningError;

/// Transient upstream overload: the document was left untouched and the
/// current cycle must stop. Not an error state for the document.
#[derive(Debug, thiserror::Error)]
#[error("reasoning service overloaded (HTTP {status}); cycle aborted")]
pub struct CycleAbort {
    pub status: u16,
}

/// Everything one attempt produced, for logging and the poller status.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub document_id: i64,
    pub success: bool,
    pub status: Option<PipelineStatus>,
    pub traits: Option<PdfTraits>,
    pub routing: Option<RoutingDecision>,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub resolved: Option<ResolvedClassification>,
    pub confidence: Option<ConfidenceScore>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl PipelineOutcome {
    fn new(document_id: i64) -> Self {
        Self {
            document_id,
            success: false,
            status: None,
            traits: None,
            routing: None,
            model: String::new(),
            usage: None,
            resolved: None,
            confidence: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn cost_usd(&self) -> f64 {
        self.usage.as_ref().map(|u| u.cost_usd).unwrap_or(0.0)
    }
}

/// Human-edited field set applied through the review surface. Same
/// atomic contract as the machine path: explicit `None` metadata clears
/// the archive value.
#[derive(Debug, Clone, Deserialize)]
pub struct EditedFields {
    pub title: Option<String>,
    pub correspondent: Option<i64>,
    pub document_type: Option<i64>,
    pub storage_path: Option<i64>,
    pub created_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

pub struct ClassificationPipeline {
    archive: Arc<dyn ArchiveClient>,
    reasoning: Arc<dyn ReasoningClient>,
    cache: Arc<RwLock<EntityCache>>,
    db: Arc<Mutex<Connection>>,
    settings: Settings,
    /// Built lazily, reused verbatim across requests so provider-side
    /// prompt caching stays effective. Cleared on cache refresh.
    system_prompt: Mutex<Option<String>>,
}

impl ClassificationPipeline {
    pub fn new(
        archive: Arc<dyn ArchiveClient>,
        reasoning: Arc<dyn ReasoningClient>,
        cache: Arc<RwLock<EntityCache>>,
        db: Arc<Mutex<Connection>>,
        settings: Settings,
    ) -> Self {
        Self {
            archive,
            reasoning,
            cache,
            db,
            settings,
            system_prompt: Mutex::new(None),
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, EntityCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Force prompt regeneration on the next classification. Call after
    /// any entity cache refresh.
    pub fn invalidate_prompt(&self) {
        let mut prompt = self.system_prompt.lock().unwrap_or_else(|e| e.into_inner());
        *prompt = None;
        tracing::debug!("system prompt invalidated");
    }

    fn system_prompt(&self, cache: &EntityCache, fields: &WorkflowFields) -> String {
        let mut cached = self.system_prompt.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prompt) = cached.as_ref() {
            return prompt.clone();
        }
        let data = PromptData {
            correspondents: cache.correspondent_names(),
            document_types: cache.document_type_names(),
            tags: cache.tag_names(),
            storage_paths: cache.storage_path_names(),
            person_options: fields
                .person_field_id
                .map(|id| cache.select_option_labels(id))
                .unwrap_or_default(),
            house_register_options: fields
                .house_register_field_id
                .map(|id| cache.select_option_labels(id))
                .unwrap_or_default(),
        };
        let prompt = build_system_prompt(&data);
        tracing::info!(chars = prompt.len(), "system prompt built");
        *cached = Some(prompt.clone());
        prompt
    }

    // ── Main entry ──────────────────────────────────────────

    /// Run the full pipeline for one document.
    ///
    /// `Ok` covers success and permanent failures (both recorded);
    /// `Err(CycleAbort)` only signals transient upstream overload.
    pub fn process_document(&self, document_id: i64) -> Result<PipelineOutcome, CycleAbort> {
        let started = Instant::now();
        let mut outcome = PipelineOutcome::new(document_id);
        tracing::info!(document_id, "pipeline start");

        let cache = self.read_cache();
        let fields = match WorkflowFields::from_cache(&cache, &self.settings) {
            Ok(fields) => fields,
            Err(e) => {
                return Ok(self.finish_failed(outcome, started, None, None, &e.to_string()));
            }
        };

        // FETCHED
        let doc = match self.archive.get_document(document_id) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(document_id, error = %e, "could not fetch document");
                return Ok(self.finish_failed(outcome, started, None, None, &e.to_string()));
            }
        };
        let pdf = match self.archive.download_original(document_id) {
            Ok(pdf) => pdf,
            Err(e) => {
                tracing::error!(document_id, error = %e, "could not download original");
                self.write_terminal_status(&doc, &fields, &cache, PipelineStatus::Error);
                return Ok(self.finish_failed(outcome, started, None, None, &e.to_string()));
            }
        };

        // ROUTED (no side effect on the archive)
        let traits = match analyze_pdf(&pdf) {
            Ok(traits) => traits,
            Err(e) => {
                // Not processable, but nothing is wrong either: mark the
                // document skipped so it leaves the trigger queue quietly.
                tracing::warn!(document_id, error = %e, "unsupported document; skipping");
                self.write_terminal_status(&doc, &fields, &cache, PipelineStatus::Skipped);
                return Ok(self.finish_failed(
                    outcome,
                    started,
                    None,
                    Some(PipelineStatus::Skipped),
                    &e.to_string(),
                ));
            }
        };
        // "Known" requires a prior pipeline pass, not just an archive-side
        // auto-match: the archive's own matcher is unreliable on first
        // encounter and must not short-circuit the capable tier.
        let has_prior_status = doc.custom_field_value(fields.status_field_id).is_some();
        let correspondent_known = doc.correspondent.is_some() && has_prior_status;
        let expects_stamp = traits.is_image_pdf;
        let routing = select_tier(&traits, correspondent_known, expects_stamp);
        let model = match &self.settings.force_model {
            Some(forced) => forced.clone(),
            None => match routing.tier {
                ModelTier::Capable => self.settings.capable_model.clone(),
                ModelTier::Fast => self.settings.fast_model.clone(),
            },
        };
        tracing::info!(document_id, tier = routing.tier.as_str(), %model, reason = %routing.reason, "model selected");
        outcome.traits = Some(traits);
        outcome.routing = Some(routing);
        outcome.model = model.clone();

        // CLASSIFIED
        let prompt = self.system_prompt(&cache, &fields);
        let response = match self.reasoning.classify(&pdf, &prompt, &model) {
            Ok(response) => response,
            Err(ReasoningError::Overloaded { status }) => {
                // Leave the archive untouched; the document retries in a
                // later cycle without manual intervention.
                tracing::warn!(
                    document_id,
                    status,
                    "reasoning service overloaded; aborting cycle"
                );
                return Err(CycleAbort { status });
            }
            Err(e) => {
                tracing::error!(document_id, error = %e, "classification failed");
                self.write_terminal_status(&doc, &fields, &cache, PipelineStatus::Error);
                return Ok(self.finish_failed(outcome, started, None, None, &e.to_string()));
            }
        };
        outcome.usage = Some(response.usage.clone());
        tracing::info!(
            document_id,
            title = %response.proposal.title,
            confidence = response.proposal.confidence.as_str(),
            cost_usd = response.usage.cost_usd,
            "proposal received"
        );

        // RESOLVED
        let resolved = resolve_proposal(&response.proposal, &cache, &fields);

        // SCORED
        let confidence = evaluate(&response.proposal, &resolved, &self.settings.weights);

        // APPLIED: exactly one atomic update request
        let apply_result = self.apply(&doc, &response, &resolved, &confidence, &fields, &cache);
        outcome.resolved = Some(resolved);
        outcome.confidence = Some(confidence);
        match apply_result {
            Ok(status) => {
                outcome.success = true;
                outcome.status = Some(status);
            }
            Err(e) => {
                // Write failure: the document keeps its pre-attempt state.
                // No second write attempt.
                tracing::error!(document_id, error = %e, "atomic apply failed");
                outcome.status = Some(PipelineStatus::Error);
                outcome.error = Some(e.to_string());
            }
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        self.record(&outcome, Some(&response));
        tracing::info!(
            document_id,
            success = outcome.success,
            status = outcome.status.map(|s| s.as_str()).unwrap_or(""),
            duration_ms = outcome.duration_ms,
            "pipeline finished"
        );
        Ok(outcome)
    }

    // ── Apply ───────────────────────────────────────────────

    /// Build and send the single atomic update for a scored document.
    fn apply(
        &self,
        doc: &Document,
        response: &ClassifyResponse,
        resolved: &ResolvedClassification,
        confidence: &ConfidenceScore,
        fields: &WorkflowFields,
        cache: &EntityCache,
    ) -> Result<PipelineStatus, ArchiveError> {
        let status = confidence.policy.status();
        let status_option = cache.require_select_option_id(fields.status_field_id, status.as_str())?;

        let mut tags: BTreeSet<i64> = doc.tags.iter().copied().collect();
        tags.remove(&fields.trigger_tag_id);

        let mut cf_map: BTreeMap<i64, serde_json::Value> = doc
            .custom_fields
            .iter()
            .map(|cf| (cf.field, cf.value.clone()))
            .collect();
        cf_map.insert(
            fields.status_field_id,
            serde_json::Value::String(status_option),
        );

        let mut patch = DocumentPatch::default();

        if confidence.policy.applies_fields() {
            if !resolved.title.is_empty() {
                patch.title = Some(resolved.title.clone());
            }
            // Explicit nulls are intentional: the proposal's "no opinion"
            // overrides an untrusted archive-side auto-match.
            patch.correspondent = Some(resolved.correspondent_id);
            patch.document_type = Some(resolved.document_type_id);
            patch.storage_path = Some(resolved.storage_path_id);
            if let Some(date) = &resolved.date {
                patch.created_date = Some(date.clone());
            }
            for tag_id in &resolved.tag_ids {
                if *tag_id != fields.trigger_tag_id {
                    tags.insert(*tag_id);
                }
            }
            for cf in &resolved.custom_fields {
                cf_map.insert(cf.field_id, cf.value.clone());
            }

            // Digital-born documents carry no physical filing metadata;
            // stale values from earlier scans are removed here.
            if !response.proposal.is_scanned_document {
                if response.proposal.pagination_stamp.is_none() {
                    if let Some(field_id) = fields.pagination_field_id {
                        cf_map.remove(&field_id);
                    }
                }
                for field_id in [
                    fields.house_register_field_id,
                    fields.house_sequence_field_id,
                ]
                .into_iter()
                .flatten()
                {
                    cf_map.remove(&field_id);
                }
            }
            tracing::info!(document_id = doc.id, level = confidence.level.as_str(), "applying fields");
        } else {
            tracing::info!(document_id = doc.id, "low confidence; fields withheld");
        }

        patch.tags = Some(tags.into_iter().collect());
        patch.custom_fields = Some(
            cf_map
                .into_iter()
                .map(|(field, value)| CustomFieldValue { field, value })
                .collect(),
        );

        self.archive.update_document(doc.id, &patch)?;
        Ok(status)
    }

    /// Apply a human-edited field set through the same atomic contract.
    /// Sets the pipeline status to "manual" and removes the trigger tag.
    pub fn apply_edited(
        &self,
        document_id: i64,
        edited: &EditedFields,
    ) -> Result<Document, ArchiveError> {
        let cache = self.read_cache();
        let fields = WorkflowFields::from_cache(&cache, &self.settings)?;
        let doc = self.archive.get_document(document_id)?;

        let status_option = cache
            .require_select_option_id(fields.status_field_id, PipelineStatus::Manual.as_str())?;

        let mut tags: BTreeSet<i64> = doc.tags.iter().copied().collect();
        tags.remove(&fields.trigger_tag_id);
        for tag_id in &edited.tags {
            if *tag_id != fields.trigger_tag_id {
                tags.insert(*tag_id);
            }
        }

        let mut cf_map: BTreeMap<i64, serde_json::Value> = doc
            .custom_fields
            .iter()
            .map(|cf| (cf.field, cf.value.clone()))
            .collect();
        for cf in &edited.custom_fields {
            cf_map.insert(cf.field, cf.value.clone());
        }
        cf_map.insert(
            fields.status_field_id,
            serde_json::Value::String(status_option),
        );

        let patch = DocumentPatch {
            title: edited.title.clone(),
            correspondent: Some(edited.correspondent),
            document_type: Some(edited.document_type),
            storage_path: Some(edited.storage_path),
            created_date: edited.created_date.clone(),
            tags: Some(tags.into_iter().collect()),
            custom_fields: Some(
                cf_map
                    .into_iter()
                    .map(|(field, value)| CustomFieldValue { field, value })
                    .collect(),
            ),
        };
        let updated = self.archive.update_document(document_id, &patch)?;
        tracing::info!(document_id, "human-edited fields applied");
        Ok(updated)
    }

    // ── Error path ──────────────────────────────────────────

    /// Best-effort single PATCH: terminal status plus trigger removal, so
    /// the document neither loops nor lingers as unprocessed. Distinct
    /// from the transient path, which makes no archive write at all.
    fn write_terminal_status(
        &self,
        doc: &Document,
        fields: &WorkflowFields,
        cache: &EntityCache,
        status: PipelineStatus,
    ) {
        let mut tags: Vec<i64> = doc
            .tags
            .iter()
            .copied()
            .filter(|&id| id != fields.trigger_tag_id)
            .collect();
        tags.sort_unstable();

        let mut cf_map: BTreeMap<i64, serde_json::Value> = doc
            .custom_fields
            .iter()
            .map(|cf| (cf.field, cf.value.clone()))
            .collect();
        match cache.select_option_id(fields.status_field_id, status.as_str()) {
            Some(option_id) => {
                cf_map.insert(fields.status_field_id, serde_json::Value::String(option_id));
            }
            None => {
                tracing::error!(
                    document_id = doc.id,
                    status = status.as_str(),
                    "status option missing on the status field"
                );
            }
        }

        let patch = DocumentPatch {
            tags: Some(tags),
            custom_fields: Some(
                cf_map
                    .into_iter()
                    .map(|(field, value)| CustomFieldValue { field, value })
                    .collect(),
            ),
            ..Default::default()
        };
        if let Err(e) = self.archive.update_document(doc.id, &patch) {
            tracing::error!(document_id = doc.id, error = %e, "could not write error status");
        }
    }

    fn finish_failed(
        &self,
        mut outcome: PipelineOutcome,
        started: Instant,
        response: Option<&ClassifyResponse>,
        status: Option<PipelineStatus>,
        error: &str,
    ) -> PipelineOutcome {
        outcome.error = Some(error.to_string());
        outcome.status = Some(status.unwrap_or(PipelineStatus::Error));
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        self.record(&outcome, response);
        outcome
    }

    // ── Persistence ─────────────────────────────────────────

    /// Persist one attempt. Failures are logged, never propagated; a
    /// broken history must not take the pipeline down.
    fn record(&self, outcome: &PipelineOutcome, response: Option<&ClassifyResponse>) {
        let mut record = OutcomeRecord::begin(outcome.document_id);
        record.model = outcome.model.clone();
        record.tier = outcome
            .routing
            .as_ref()
            .map(|r| r.tier.as_str().to_string())
            .unwrap_or_default();
        record.duration_ms = outcome.duration_ms;
        if let Some(usage) = &outcome.usage {
            record.input_tokens = usage.input_tokens;
            record.output_tokens = usage.output_tokens;
            record.cache_read_tokens = usage.cache_read_tokens;
            record.cache_write_tokens = usage.cache_write_tokens;
            record.cost_usd = usage.cost_usd;
        }
        record.confidence = outcome
            .confidence
            .as_ref()
            .map(|c| c.level.as_str().to_string());
        record.score = outcome.confidence.as_ref().map(|c| c.score);
        record.status = outcome
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| PipelineStatus::Error.as_str().to_string());
        record.error_message = outcome.error.clone();
        if let Some(response) = response {
            record.proposal_json = Some(response.raw_answer.clone());
            record.reasoning = Some(response.proposal.reasoning.clone());
        }
        if let Some(resolved) = &outcome.resolved {
            record.resolved_json = serde_json::to_string(resolved).ok();
            record.create_candidates_json =
                serde_json::to_string(&resolved.create_candidates).ok();
        }

        let conn = self.lock_db();
        if let Err(e) = insert_outcome(&conn, &record) {
            tracing::error!(document_id = outcome.document_id, error = %e, "could not persist outcome");
        }
    }
}
