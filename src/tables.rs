// src/tables.rs
//
// CSV boundary for the engine. Column names and order are part of the sheet
// contract; required headers are checked up front so a missing column fails
// the whole batch with one descriptive error.

use anyhow::{Context, Result};
use csv::StringRecord;
use serde::Serialize;
use std::io::{Read, Write};
use tracing::warn;

use crate::attendance::{DailyLedgerRow, EngineError, RawAttendanceRow};
use crate::overtime::OvertimeApplicationRow;

pub const LEDGER_COLUMNS: [&str; 9] = [
    "이름",
    "조직",
    "직급",
    "날짜",
    "시작시각",
    "종료시각",
    "지각",
    "기본근무시간",
    "총근무시간",
];

pub const APPLICATION_COLUMNS: [&str; 5] = ["문서번호", "이름", "근무유형", "신청일", "상태"];

pub const MONTHLY_COLUMNS: [&str; 8] = [
    "이름",
    "조직",
    "직급",
    "일수",
    "총근무시간",
    "기본근무시간",
    "연장",
    "지각횟수",
];

pub const ENRICHED_COLUMNS: [&str; 7] = [
    "문서번호",
    "이름",
    "근무유형",
    "신청일",
    "상태",
    "총근무시간",
    "결과",
];

pub const RESULT_COLUMNS: [&str; 5] = ["문서번호", "이름", "신청일", "총근무시간", "결과"];

// --- Header Binding ---

fn find_column(headers: &StringRecord, name: &str) -> Result<usize, EngineError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| EngineError::MissingColumn {
            column: name.to_string(),
        })
}

pub fn ensure_columns(headers: &StringRecord, required: &[&str]) -> Result<(), EngineError> {
    for name in required {
        find_column(headers, name)?;
    }
    Ok(())
}

fn cell(record: &StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").trim().to_string()
}

fn cell_opt(record: &StringRecord, index: usize) -> Option<String> {
    let value = cell(record, index);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Sheet dates arrive as a date or a date-time; only the date is kept.
fn parse_sheet_date(value: &str) -> Option<chrono::NaiveDate> {
    let date_part = value.trim().split_whitespace().next()?;
    chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(date_part, "%Y/%m/%d"))
        .ok()
}

// --- Readers ---

/// Reads the raw swipe export. Rows with an unreadable date cell are dropped
/// with a warning; value-level problems never fail the batch, only a missing
/// header does.
pub fn read_raw_rows<R: Read>(input: R) -> Result<Vec<RawAttendanceRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader
        .headers()
        .context("Reading raw attendance sheet header")?
        .clone();

    let employee = find_column(&headers, "이름")?;
    let organization = find_column(&headers, "조직")?;
    let role = find_column(&headers, "직급")?;
    let work_type = find_column(&headers, "근무유형")?;
    let leave_type = find_column(&headers, "휴가시간")?;
    let date = find_column(&headers, "날짜")?;
    let start = find_column(&headers, "시작시각")?;
    let end = find_column(&headers, "종료시각")?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading raw attendance row {}", line + 2))?;
        let date_cell = cell(&record, date);
        let parsed_date = match parse_sheet_date(&date_cell) {
            Some(d) => d,
            None => {
                warn!("Dropping row {} with unreadable date {:?}", line + 2, date_cell);
                continue;
            }
        };
        rows.push(RawAttendanceRow {
            employee: cell(&record, employee),
            organization: cell(&record, organization),
            role: cell(&record, role),
            work_type: cell(&record, work_type),
            leave_type: cell(&record, leave_type),
            date: parsed_date,
            start: cell_opt(&record, start),
            end: cell_opt(&record, end),
        });
    }
    Ok(rows)
}

/// Reads a previously written daily-ledger sheet back. The raw minute count
/// is not a sheet column, so rows come back with `total_minutes` unset and
/// reconciliation re-parses the duration label per row.
pub fn read_daily_ledger<R: Read>(input: R) -> Result<Vec<DailyLedgerRow>> {
    let mut reader = csv::Reader::from_reader(input);
    ensure_columns(reader.headers().context("Reading ledger header")?, &LEDGER_COLUMNS)?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<DailyLedgerRow>().enumerate() {
        rows.push(record.with_context(|| format!("Reading ledger row {}", line + 2))?);
    }
    Ok(rows)
}

pub fn read_applications<R: Read>(input: R) -> Result<Vec<OvertimeApplicationRow>> {
    let mut reader = csv::Reader::from_reader(input);
    ensure_columns(
        reader.headers().context("Reading application sheet header")?,
        &APPLICATION_COLUMNS,
    )?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<OvertimeApplicationRow>().enumerate() {
        rows.push(record.with_context(|| format!("Reading application row {}", line + 2))?);
    }
    Ok(rows)
}

// --- Writer ---

/// Writes one of the output tables. The header row is written explicitly
/// from the table's column constants so an empty table still carries the
/// sheet contract and can be read back.
pub fn write_table<S: Serialize, W: Write>(output: W, columns: &[&str], rows: &[S]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(columns).context("Writing header row")?;
    for row in rows {
        writer.serialize(row).context("Writing output row")?;
    }
    writer.flush().context("Flushing output table")?;
    Ok(())
}
