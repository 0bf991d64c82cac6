//! Cycle driver — discovers trigger-tagged documents and feeds them to
//! the pipeline, one at a time.
//!
//! Runs on its own thread with granulated sleeps so shutdown stays
//! responsive. Each cycle:
//! 1. budget gate (monthly cost vs. configured limit) — pause, not error
//! 2. discover documents carrying the trigger tag, in archive order
//! 3. process sequentially with a fixed inter-document delay
//!
//! A transient reasoning overload aborts the remainder of the cycle
//! immediately; the untouched documents are picked up again next cycle.
//! Stop and pause are checked between documents, never mid-document, so
//! a document is never left half-applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::classifier::PipelineStatus;
use crate::db::repository::current_month_cost;
use crate::state::AppState;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Stopped,
    Running,
    Processing,
    Paused,
}

/// Status snapshot for the dashboard API. Updated at every state change.
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub state: PollerState,
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
    pub current_document: Option<i64>,
    pub documents_processed: u64,
    pub documents_errored: u64,
    pub last_error: Option<String>,
    pub budget_paused: bool,
}

impl Default for PollerStatus {
    fn default() -> Self {
        Self {
            state: PollerState::Stopped,
            last_run_at: None,
            next_run_at: None,
            current_document: None,
            documents_processed: 0,
            documents_errored: 0,
            last_error: None,
            budget_paused: false,
        }
    }
}

/// Shared control surface between the poller thread and the API.
#[derive(Default)]
pub struct PollerControls {
    shutdown: AtomicBool,
    paused: AtomicBool,
    status: RwLock<PollerStatus>,
}

impl PollerControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Pause after the current document. Processing resumes with
    /// [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.update(|s| s.state = PollerState::Paused);
        tracing::info!("poller paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.update(|s| {
            s.state = PollerState::Running;
            s.budget_paused = false;
        });
        tracing::info!("poller resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn pause_for_budget(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.update(|s| {
            s.state = PollerState::Paused;
            s.budget_paused = true;
        });
        tracing::warn!("poller paused: monthly budget reached");
    }

    pub fn snapshot(&self) -> PollerStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut PollerStatus)) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }
}

/// Handle for the poller thread. Dropping it requests shutdown and joins.
pub struct PollerHandle {
    controls: Arc<PollerControls>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl PollerHandle {
    pub fn shutdown(&self) {
        self.controls.request_shutdown();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start the polling loop on a background thread.
pub fn start(state: Arc<AppState>) -> PollerHandle {
    let controls = state.poller.clone();
    controls.update(|s| s.state = PollerState::Running);

    let interval = state.settings.poll_interval_secs;
    let thread_controls = controls.clone();
    let handle = std::thread::spawn(move || {
        tracing::info!(
            interval_secs = interval,
            budget_usd = state.settings.monthly_budget_usd,
            "poller started"
        );
        loop {
            if thread_controls.is_shutdown() {
                break;
            }
            if thread_controls.is_paused() {
                if !sleep_with_shutdown(SLEEP_GRANULARITY_SECS, &thread_controls) {
                    break;
                }
                continue;
            }

            run_cycle(&state);

            thread_controls.update(|s| {
                s.next_run_at = Some(
                    (Utc::now() + chrono::Duration::seconds(interval as i64)).to_rfc3339(),
                );
            });
            if !sleep_with_shutdown(interval, &thread_controls) {
                break;
            }
        }
        thread_controls.update(|s| {
            s.state = PollerState::Stopped;
            s.current_document = None;
            s.next_run_at = None;
        });
        tracing::info!("poller stopped");
    });

    PollerHandle {
        controls,
        handle: Some(handle),
    }
}

/// Sleep in small increments; false when shutdown was requested.
fn sleep_with_shutdown(secs: u64, controls: &PollerControls) -> bool {
    let granules = secs.div_ceil(SLEEP_GRANULARITY_SECS).max(1);
    for _ in 0..granules {
        if controls.is_shutdown() {
            return false;
        }
        std::thread::sleep(Duration::from_secs(SLEEP_GRANULARITY_SECS.min(secs.max(1))));
    }
    !controls.is_shutdown()
}

/// One pass over all currently trigger-tagged documents.
///
/// Public so the manual-trigger surface and tests can drive a cycle
/// synchronously.
pub fn run_cycle(state: &AppState) {
    let controls = &state.poller;

    if budget_reached(state) {
        controls.pause_for_budget();
        return;
    }

    let trigger_tag_id = {
        let cache = state.read_cache();
        match cache.require_tag_id(&state.settings.trigger_tag) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "trigger tag unknown; skipping cycle");
                controls.update(|s| s.last_error = Some(e.to_string()));
                return;
            }
        }
    };

    let documents = match state.archive.find_documents_by_tag(trigger_tag_id) {
        Ok(documents) => documents,
        Err(e) => {
            tracing::error!(error = %e, "document discovery failed");
            controls.update(|s| {
                s.last_error = Some(format!("discovery failed: {e}"));
                s.last_run_at = Some(Utc::now().to_rfc3339());
            });
            return;
        }
    };

    if documents.is_empty() {
        tracing::debug!("no trigger-tagged documents");
        controls.update(|s| s.last_run_at = Some(Utc::now().to_rfc3339()));
        return;
    }
    tracing::info!(count = documents.len(), "trigger-tagged documents found");

    for (index, doc) in documents.iter().enumerate() {
        // Cooperative checks between documents only; a document is
        // never abandoned mid-flight.
        if controls.is_shutdown() || controls.is_paused() {
            tracing::info!("stop/pause requested; ending cycle");
            break;
        }
        if budget_reached(state) {
            let remaining = documents.len() - index;
            tracing::warn!(remaining, "budget reached; remaining documents wait");
            controls.pause_for_budget();
            break;
        }
        if index > 0 && state.settings.document_delay_secs > 0 {
            std::thread::sleep(Duration::from_secs(state.settings.document_delay_secs));
        }

        controls.update(|s| {
            s.state = PollerState::Processing;
            s.current_document = Some(doc.id);
        });
        tracing::info!(document_id = doc.id, title = %doc.title, "processing document");

        match state.pipeline.process_document(doc.id) {
            // A deliberate skip is a concluded document, not a failure.
            Ok(outcome)
                if outcome.success || outcome.status == Some(PipelineStatus::Skipped) =>
            {
                controls.update(|s| s.documents_processed += 1);
            }
            Ok(outcome) => {
                controls.update(|s| {
                    s.documents_errored += 1;
                    s.last_error = Some(format!(
                        "document {}: {}",
                        doc.id,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    ));
                });
            }
            Err(abort) => {
                // Documents up to here are fully applied; the rest stay
                // untouched until the next cycle.
                let remaining = documents.len() - index - 1;
                tracing::warn!(
                    document_id = doc.id,
                    status = abort.status,
                    remaining,
                    "transient overload; cycle aborted"
                );
                controls.update(|s| {
                    s.last_error = Some(format!(
                        "overloaded at document {} (HTTP {}); {remaining} left for next cycle",
                        doc.id, abort.status
                    ));
                });
                break;
            }
        }
    }

    controls.update(|s| {
        s.current_document = None;
        s.last_run_at = Some(Utc::now().to_rfc3339());
        if s.state == PollerState::Processing {
            s.state = PollerState::Running;
        }
    });
}

fn budget_reached(state: &AppState) -> bool {
    let limit = state.settings.monthly_budget_usd;
    if limit <= 0.0 {
        return false;
    }
    let conn = state.lock_db();
    match current_month_cost(&conn) {
        Ok(cost) if cost >= limit => {
            tracing::warn!(cost, limit, "monthly budget reached");
            true
        }
        Ok(_) => false,
        Err(e) => {
            // Fail closed: without readable cost data, do not spend.
            tracing::error!(error = %e, "cost lookup failed; treating budget as reached");
            true
        }
    }
}
