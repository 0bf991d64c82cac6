//! Outcome store — append-only processing history and cost aggregation.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DatabaseError;

/// One processing attempt. Never mutated after insertion; retries and
/// manual re-triggers append new rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub attempt_id: String,
    pub document_id: i64,
    /// RFC 3339 UTC.
    pub processed_at: String,

    pub model: String,
    pub tier: String,
    pub duration_ms: u64,

    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,

    pub confidence: Option<String>,
    pub score: Option<f64>,
    pub status: String,
    pub error_message: Option<String>,

    /// Proposal exactly as received, for audit.
    pub proposal_json: Option<String>,
    pub resolved_json: Option<String>,
    pub create_candidates_json: Option<String>,
    pub reasoning: Option<String>,
}

impl OutcomeRecord {
    /// Skeleton record for one attempt, stamped now.
    pub fn begin(document_id: i64) -> Self {
        Self {
            attempt_id: Uuid::new_v4().to_string(),
            document_id,
            processed_at: Utc::now().to_rfc3339(),
            model: String::new(),
            tier: String::new(),
            duration_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            cost_usd: 0.0,
            confidence: None,
            score: None,
            status: String::new(),
            error_message: None,
            proposal_json: None,
            resolved_json: None,
            create_candidates_json: None,
            reasoning: None,
        }
    }
}

pub fn insert_outcome(conn: &Connection, record: &OutcomeRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO processed_documents
         (attempt_id, document_id, processed_at, model, tier, duration_ms,
          input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd,
          confidence, score, status, error_message,
          proposal_json, resolved_json, create_candidates_json, reasoning)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            record.attempt_id,
            record.document_id,
            record.processed_at,
            record.model,
            record.tier,
            record.duration_ms as i64,
            record.input_tokens as i64,
            record.output_tokens as i64,
            record.cache_read_tokens as i64,
            record.cache_write_tokens as i64,
            record.cost_usd,
            record.confidence,
            record.score,
            record.status,
            record.error_message,
            record.proposal_json,
            record.resolved_json,
            record.create_candidates_json,
            record.reasoning,
        ],
    )?;
    Ok(())
}

/// Total cost of attempts whose timestamp falls in the given month
/// (`"YYYY-MM"`).
pub fn monthly_cost(conn: &Connection, month: &str) -> Result<f64, DatabaseError> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(cost_usd), 0.0) FROM processed_documents
         WHERE processed_at LIKE ?1 || '%'",
        params![month],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Month-to-date cost for the current UTC month.
pub fn current_month_cost(conn: &Connection) -> Result<f64, DatabaseError> {
    monthly_cost(conn, &Utc::now().format("%Y-%m").to_string())
}

/// Most recent attempts, newest first.
pub fn recent_outcomes(conn: &Connection, limit: u32) -> Result<Vec<OutcomeRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT attempt_id, document_id, processed_at, model, tier, duration_ms,
                input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd,
                confidence, score, status, error_message,
                proposal_json, resolved_json, create_candidates_json, reasoning
         FROM processed_documents ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], row_to_record)?;
    collect_rows(rows)
}

/// Latest attempt for one document, if any.
pub fn latest_outcome(
    conn: &Connection,
    document_id: i64,
) -> Result<Option<OutcomeRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT attempt_id, document_id, processed_at, model, tier, duration_ms,
                input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd,
                confidence, score, status, error_message,
                proposal_json, resolved_json, create_candidates_json, reasoning
         FROM processed_documents WHERE document_id = ?1 ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![document_id], row_to_record)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Documents whose latest attempt ended in "review", newest first.
/// Superseded attempts (a later retry with a different status) drop out.
pub fn review_queue(conn: &Connection) -> Result<Vec<OutcomeRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT attempt_id, document_id, processed_at, model, tier, duration_ms,
                input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd,
                confidence, score, status, error_message,
                proposal_json, resolved_json, create_candidates_json, reasoning
         FROM processed_documents p
         WHERE p.status = 'review'
           AND p.id = (SELECT MAX(id) FROM processed_documents q
                       WHERE q.document_id = p.document_id)
         ORDER BY p.id DESC",
    )?;
    let rows = stmt.query_map([], row_to_record)?;
    collect_rows(rows)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<OutcomeRecord> {
    Ok(OutcomeRecord {
        attempt_id: row.get(0)?,
        document_id: row.get(1)?,
        processed_at: row.get(2)?,
        model: row.get(3)?,
        tier: row.get(4)?,
        duration_ms: row.get::<_, i64>(5)? as u64,
        input_tokens: row.get::<_, i64>(6)? as u64,
        output_tokens: row.get::<_, i64>(7)? as u64,
        cache_read_tokens: row.get::<_, i64>(8)? as u64,
        cache_write_tokens: row.get::<_, i64>(9)? as u64,
        cost_usd: row.get(10)?,
        confidence: row.get(11)?,
        score: row.get(12)?,
        status: row.get(13)?,
        error_message: row.get(14)?,
        proposal_json: row.get(15)?,
        resolved_json: row.get(16)?,
        create_candidates_json: row.get(17)?,
        reasoning: row.get(18)?,
    })
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<OutcomeRecord>>,
) -> Result<Vec<OutcomeRecord>, DatabaseError> {
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}
