// src/overtime.rs
//
// Stage 2 of the attendance pipeline: reconciles employee-submitted
// overtime/night-shift applications against the stage-1 daily ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::attendance::{parse_duration_label, AttendanceRules, DailyLedgerRow, EngineError};

// --- Row Types ---

/// One submitted overtime/night-shift application as it comes off the
/// approval-system export. Field order is the sheet column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertimeApplicationRow {
    #[serde(rename = "문서번호")]
    pub document_id: String,
    #[serde(rename = "이름")]
    pub employee: String,
    /// Either a plain tag string or a JSON list of tag strings; the export
    /// produces both shapes.
    #[serde(rename = "근무유형")]
    pub work_type_tags: String,
    /// Date or date-time string; only the calendar date is compared.
    #[serde(rename = "신청일")]
    pub application_date: String,
    #[serde(rename = "상태")]
    pub status: String,
}

impl OvertimeApplicationRow {
    /// Calendar date of the application, time-of-day discarded.
    pub fn application_day(&self) -> Option<NaiveDate> {
        parse_day(&self.application_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "확정")]
    Confirmed,
    #[serde(rename = "취소")]
    Cancelled,
    #[serde(rename = "확인필요")]
    NeedsReview,
}

/// Application enriched with the reconciliation result; every input column
/// plus matched duration and outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedApplication {
    #[serde(rename = "문서번호")]
    pub document_id: String,
    #[serde(rename = "이름")]
    pub employee: String,
    #[serde(rename = "근무유형")]
    pub work_type_tags: String,
    #[serde(rename = "신청일")]
    pub application_date: String,
    #[serde(rename = "상태")]
    pub status: String,
    #[serde(rename = "총근무시간")]
    pub matched_duration: String,
    #[serde(rename = "결과")]
    pub outcome: Outcome,
}

/// Narrowed result view for the reviewers' sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileResult {
    #[serde(rename = "문서번호")]
    pub document_id: String,
    #[serde(rename = "이름")]
    pub employee: String,
    #[serde(rename = "신청일")]
    pub application_date: String,
    #[serde(rename = "총근무시간")]
    pub matched_duration: String,
    #[serde(rename = "결과")]
    pub outcome: Outcome,
}

/// A ledger entry whose duration label could not be read back. The affected
/// application stays at needs-review instead of aborting the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub document_id: String,
    pub error: EngineError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutput {
    pub enriched: Vec<EnrichedApplication>,
    pub results: Vec<ReconcileResult>,
    pub row_errors: Vec<RowError>,
}

// --- Helpers ---

fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.split_whitespace().next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y/%m/%d"))
        .ok()
}

/// The tag cell is either a plain string or a JSON list of strings.
fn tags_contain(raw: &str, marker: &str) -> bool {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .iter()
            .filter_map(Value::as_str)
            .any(|tag| tag.contains(marker));
    }
    raw.contains(marker)
}

fn is_cancelled(status: &str, rules: &AttendanceRules) -> bool {
    let status = status.trim();
    status == rules.cancelled_status || status.eq_ignore_ascii_case("cancelled")
}

/// Minutes behind a ledger row's total, preferring the raw count carried by
/// the engine and re-parsing the label only for re-read sheets.
fn ledger_minutes(row: &DailyLedgerRow) -> Result<i64, EngineError> {
    match row.total_minutes {
        Some(minutes) => Ok(minutes),
        None => parse_duration_label(&row.total).map(|d| d.num_minutes()),
    }
}

// --- Entry Point ---

/// Filters applications to night-shift requests and classifies each against
/// the daily ledger: a matched day of at least the confirm threshold is
/// confirmed, a cancelled status always wins, everything else needs review.
pub fn reconcile_overtime(
    ledger: &[DailyLedgerRow],
    applications: &[OvertimeApplicationRow],
    rules: &AttendanceRules,
) -> ReconcileOutput {
    let mut by_key: HashMap<(&str, NaiveDate), &DailyLedgerRow> = HashMap::new();
    for row in ledger {
        match parse_day(&row.date) {
            Some(day) => {
                by_key.insert((row.employee.as_str(), day), row);
            }
            None => warn!(
                "Skipping ledger row with unreadable date {:?} for {}",
                row.date, row.employee
            ),
        }
    }

    let mut enriched = Vec::new();
    let mut results = Vec::new();
    let mut row_errors = Vec::new();

    for app in applications {
        if !tags_contain(&app.work_type_tags, &rules.night_shift_marker) {
            debug!(
                "Skipping non-night-shift application {} ({})",
                app.document_id, app.work_type_tags
            );
            continue;
        }

        let mut outcome = Outcome::NeedsReview;
        let mut matched_duration = String::new();

        if let Some(day) = app.application_day() {
            if let Some(row) = by_key.get(&(app.employee.as_str(), day)) {
                matched_duration = row.total.clone();
                match ledger_minutes(row) {
                    Ok(minutes) if minutes >= rules.confirm_threshold_minutes => {
                        outcome = Outcome::Confirmed;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(
                            "Unreadable ledger duration for application {}: {}",
                            app.document_id, error
                        );
                        row_errors.push(RowError {
                            document_id: app.document_id.clone(),
                            error,
                        });
                    }
                }
            }
        }

        // The cancelled check runs after the hours check and wins ties.
        if is_cancelled(&app.status, rules) {
            outcome = Outcome::Cancelled;
        }

        enriched.push(EnrichedApplication {
            document_id: app.document_id.clone(),
            employee: app.employee.clone(),
            work_type_tags: app.work_type_tags.clone(),
            application_date: app.application_date.clone(),
            status: app.status.clone(),
            matched_duration: matched_duration.clone(),
            outcome,
        });
        results.push(ReconcileResult {
            document_id: app.document_id.clone(),
            employee: app.employee.clone(),
            application_date: app.application_date.clone(),
            matched_duration,
            outcome,
        });
    }

    info!(
        "Reconciled {} night-shift applications ({} unreadable ledger durations)",
        enriched.len(),
        row_errors.len()
    );
    ReconcileOutput {
        enriched,
        results,
        row_errors,
    }
}
