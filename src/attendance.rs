// src/attendance.rs
//
// Stage 1 of the attendance pipeline: turns the raw per-swipe export into a
// per-employee daily ledger and a monthly rollup. Every step is a pure
// function over an owned row vector; the only state is the rule set passed in.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Required column missing from input sheet: '{column}'")]
    MissingColumn { column: String },
    #[error("Malformed duration label {value:?} (expected \"<N>시간 <M>분\")")]
    MalformedDurationLabel { value: String },
}

// --- Labels & Constants ---

pub const LATE_LABEL: &str = "지각";
pub const ON_TIME_LABEL: &str = "정상";

const HOUR_LABEL: &str = "시간";
const MINUTE_LABEL: &str = "분";

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid clock literal")
}

// --- Rule Set ---

/// Every tunable the pipeline references. Defaults mirror the HR policy
/// currently in force; `late_after` is the one value that has changed between
/// policy revisions (10:00 historically, 10:30 today) and is therefore
/// overridable from the CLI and the environment.
#[derive(Debug, Clone)]
pub struct AttendanceRules {
    /// Work-type cells containing this marker belong to the excluded site.
    pub excluded_site_marker: String,
    /// Leave-type value that means a full paid day off ("8 hours").
    pub full_day_leave_sentinel: String,
    pub full_day_start: NaiveTime,
    pub full_day_end: NaiveTime,
    /// Swipes earlier than this are treated as mis-punches and raised.
    pub earliest_start: NaiveTime,
    /// Starting at or after this time counts as late.
    pub late_after: NaiveTime,
    pub same_day_break: Duration,
    pub overnight_break: Duration,
    /// Per-day ceiling on base (non-overtime) hours.
    pub daily_base_cap: Duration,
    pub contracted_hours_per_day: Duration,
    /// Work-type tag marking a night-shift overtime application.
    pub night_shift_marker: String,
    /// Application status that forces the cancelled outcome.
    pub cancelled_status: String,
    /// Minimum matched minutes for an application to be confirmed.
    pub confirm_threshold_minutes: i64,
}

impl Default for AttendanceRules {
    fn default() -> Self {
        Self {
            excluded_site_marker: "수원".to_string(),
            full_day_leave_sentinel: "8:00".to_string(),
            full_day_start: clock(9, 30),
            full_day_end: clock(18, 30),
            earliest_start: clock(8, 0),
            late_after: clock(10, 30),
            same_day_break: Duration::hours(1),
            overnight_break: Duration::hours(2),
            daily_base_cap: Duration::hours(9),
            contracted_hours_per_day: Duration::hours(8),
            night_shift_marker: "야간".to_string(),
            cancelled_status: "취소".to_string(),
            confirm_threshold_minutes: 600,
        }
    }
}

// --- Row Types ---

/// One raw swipe event as it comes off the uploaded sheet. Several rows may
/// share the same (employee, date) when someone badges in and out repeatedly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAttendanceRow {
    pub employee: String,
    /// Empty means missing; the row is dropped by the filter.
    pub organization: String,
    pub role: String,
    pub work_type: String,
    pub leave_type: String,
    pub date: NaiveDate,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Filter output with clock values parsed; absent means unparseable or empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub employee: String,
    pub organization: String,
    pub role: String,
    pub date: NaiveDate,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

/// One merged employee-day with computed durations, pre-formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkedDay {
    pub employee: String,
    pub organization: String,
    pub role: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub late: bool,
    /// Break-adjusted duration, capped at `daily_base_cap`.
    pub base: Duration,
    /// Break-adjusted duration, uncapped.
    pub total: Duration,
}

/// One formatted daily-ledger row. Field order is the sheet column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLedgerRow {
    #[serde(rename = "이름")]
    pub employee: String,
    #[serde(rename = "조직")]
    pub organization: String,
    #[serde(rename = "직급")]
    pub role: String,
    #[serde(rename = "날짜")]
    pub date: String,
    #[serde(rename = "시작시각")]
    pub start: String,
    #[serde(rename = "종료시각")]
    pub end: String,
    #[serde(rename = "지각")]
    pub lateness: String,
    #[serde(rename = "기본근무시간")]
    pub base: String,
    #[serde(rename = "총근무시간")]
    pub total: String,
    /// Raw minute count behind `total`, carried alongside the label so
    /// reconciliation never has to re-parse display text. Not a sheet column;
    /// absent when the ledger was re-read from a formatted sheet.
    #[serde(skip)]
    pub total_minutes: Option<i64>,
}

/// One monthly summary row per employee. Field order is the sheet column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummaryRow {
    #[serde(rename = "이름")]
    pub employee: String,
    #[serde(rename = "조직")]
    pub organization: String,
    #[serde(rename = "직급")]
    pub role: String,
    #[serde(rename = "일수")]
    pub day_count: u32,
    #[serde(rename = "총근무시간")]
    pub total: String,
    #[serde(rename = "기본근무시간")]
    pub base: String,
    #[serde(rename = "연장")]
    pub overtime: String,
    #[serde(rename = "지각횟수")]
    pub lateness_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceReport {
    pub monthly: Vec<MonthlySummaryRow>,
    pub daily: Vec<DailyLedgerRow>,
}

// --- RecordFilter ---

/// Drops rows with no organization, rows from the excluded site and weekend
/// dates. Dropping is silent; an empty result is a valid outcome.
pub fn filter_records(rows: Vec<RawAttendanceRow>, rules: &AttendanceRules) -> Vec<RawAttendanceRow> {
    let before = rows.len();
    let kept: Vec<RawAttendanceRow> = rows
        .into_iter()
        .filter(|row| {
            if row.organization.trim().is_empty() {
                debug!("Dropping row without organization: {} {}", row.employee, row.date);
                return false;
            }
            if row.work_type.contains(&rules.excluded_site_marker) {
                debug!(
                    "Dropping excluded-site row: {} {} ({})",
                    row.employee, row.date, row.work_type
                );
                return false;
            }
            // Monday = 0; 5 and 6 are the weekend.
            if row.date.weekday().num_days_from_monday() >= 5 {
                debug!("Dropping weekend row: {} {}", row.employee, row.date);
                return false;
            }
            true
        })
        .collect();
    info!("RecordFilter kept {}/{} rows", kept.len(), before);
    kept
}

// --- TimeNormalizer ---

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Parses swipe times (unparseable becomes absent), substitutes the fixed
/// full-day-leave window, then raises pre-08:00 starts to the floor. The
/// leave substitution runs first and is exempt from the floor clamp.
pub fn normalize_times(rows: Vec<RawAttendanceRow>, rules: &AttendanceRules) -> Vec<NormalizedRow> {
    rows.into_iter()
        .map(|row| {
            let mut start = row.start.as_deref().and_then(parse_clock);
            let mut end = row.end.as_deref().and_then(parse_clock);

            if row.leave_type.trim() == rules.full_day_leave_sentinel {
                start = Some(rules.full_day_start);
                end = Some(rules.full_day_end);
            } else if let Some(s) = start {
                if s < rules.earliest_start {
                    debug!(
                        "Raising early start {} to {} for {} on {}",
                        s, rules.earliest_start, row.employee, row.date
                    );
                    start = Some(rules.earliest_start);
                }
            }

            NormalizedRow {
                employee: row.employee,
                organization: row.organization,
                role: row.role,
                date: row.date,
                start,
                end,
            }
        })
        .collect()
}

// --- DailyMerger ---

/// Collapses all swipes sharing (employee, date) into one row taking the
/// earliest present start and the latest present end, then removes days where
/// both boundaries are still absent (holiday or fully missing day).
pub fn merge_daily(rows: Vec<NormalizedRow>) -> Vec<NormalizedRow> {
    let mut merged: Vec<NormalizedRow> = Vec::new();
    let mut index: std::collections::HashMap<(String, NaiveDate), usize> =
        std::collections::HashMap::new();

    for row in rows {
        let key = (row.employee.clone(), row.date);
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut merged[i];
                kept.start = match (kept.start, row.start) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                kept.end = match (kept.end, row.end) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            None => {
                index.insert(key, merged.len());
                merged.push(row);
            }
        }
    }

    let before = merged.len();
    merged.retain(|row| row.start.is_some() || row.end.is_some());
    if merged.len() < before {
        debug!("DailyMerger dropped {} empty days", before - merged.len());
    }
    merged
}

// --- HoursCalculator ---

/// Break-adjusted worked duration. An end earlier than the start is taken to
/// mean the shift ran past midnight; there is no separate invalid state, so a
/// same-day entry error lands in the overnight branch as well (known
/// over-approximation of the rule set).
fn calculate_working_hours(start: NaiveTime, end: NaiveTime, rules: &AttendanceRules) -> Duration {
    if end < start {
        end.signed_duration_since(start) + Duration::hours(24) - rules.overnight_break
    } else {
        end.signed_duration_since(start) - rules.same_day_break
    }
}

/// Flags lateness and computes base/total durations per merged day. Days with
/// only one boundary present cannot produce a duration and are dropped.
pub fn calculate_hours(rows: Vec<NormalizedRow>, rules: &AttendanceRules) -> Vec<WorkedDay> {
    rows.into_iter()
        .filter_map(|row| {
            let (start, end) = match (row.start, row.end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    warn!(
                        "Dropping half-open day for {} on {}: start={:?} end={:?}",
                        row.employee, row.date, row.start, row.end
                    );
                    return None;
                }
            };
            let total = calculate_working_hours(start, end, rules);
            Some(WorkedDay {
                employee: row.employee,
                organization: row.organization,
                role: row.role,
                date: row.date,
                late: start >= rules.late_after,
                base: total.min(rules.daily_base_cap),
                total,
                start,
                end,
            })
        })
        .collect()
}

// --- MonthlyAggregator ---

/// Rolls worked days up per employee. Expects `days` sorted by
/// (employee, date); organization and role are taken from the employee's
/// first day, which the sort makes deterministic.
pub fn aggregate_monthly(days: &[WorkedDay], rules: &AttendanceRules) -> Vec<MonthlySummaryRow> {
    let mut rows = Vec::new();
    let mut i = 0;
    while i < days.len() {
        let first = &days[i];
        let mut day_count: u32 = 0;
        let mut lateness_count: u32 = 0;
        let mut base_sum = Duration::zero();
        let mut total_sum = Duration::zero();
        while i < days.len() && days[i].employee == first.employee {
            day_count += 1;
            if days[i].late {
                lateness_count += 1;
            }
            base_sum = base_sum + days[i].base;
            total_sum = total_sum + days[i].total;
            i += 1;
        }

        let contracted = rules.contracted_hours_per_day * day_count as i32;
        let overtime = (total_sum - contracted).max(Duration::zero());
        // Summed daily caps can still exceed the contracted allotment when
        // partial days are present; base never shows more than contracted.
        let base_sum = base_sum.min(contracted);

        rows.push(MonthlySummaryRow {
            employee: first.employee.clone(),
            organization: first.organization.clone(),
            role: first.role.clone(),
            day_count,
            total: format_duration_label(total_sum),
            base: format_duration_label(base_sum),
            overtime: format_duration_label(overtime),
            lateness_count,
        });
    }
    rows
}

// --- Formatter ---

/// Renders a duration as "<hours>시간 <minutes>분", truncated to whole
/// minutes. Negative durations floor the hour, so -90 minutes renders as
/// "-2시간 30분".
pub fn format_duration_label(duration: Duration) -> String {
    let minutes = duration.num_minutes();
    format!(
        "{}{} {}{}",
        minutes.div_euclid(60),
        HOUR_LABEL,
        minutes.rem_euclid(60),
        MINUTE_LABEL
    )
}

static DURATION_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-?\d+)시간\s*(\d+)분\s*$").expect("valid duration label regex"));

/// Re-derives a duration from its formatted label, to the minute. Only needed
/// when a ledger crosses the boundary as a formatted sheet.
pub fn parse_duration_label(value: &str) -> Result<Duration, EngineError> {
    let malformed = || EngineError::MalformedDurationLabel {
        value: value.to_string(),
    };
    let caps = DURATION_LABEL_RE.captures(value).ok_or_else(malformed)?;
    let hours: i64 = caps[1].parse().map_err(|_| malformed())?;
    let minutes: i64 = caps[2].parse().map_err(|_| malformed())?;
    Ok(Duration::minutes(hours * 60 + minutes))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Boundary timestamps concatenate the row's date with the time-of-day.
pub fn format_boundary(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M:%S"))
}

fn to_ledger_row(day: &WorkedDay) -> DailyLedgerRow {
    DailyLedgerRow {
        employee: day.employee.clone(),
        organization: day.organization.clone(),
        role: day.role.clone(),
        date: format_date(day.date),
        start: format_boundary(day.date, day.start),
        end: format_boundary(day.date, day.end),
        lateness: (if day.late { LATE_LABEL } else { ON_TIME_LABEL }).to_string(),
        base: format_duration_label(day.base),
        total: format_duration_label(day.total),
        total_minutes: Some(day.total.num_minutes()),
    }
}

// --- Entry Point ---

/// Runs the full stage-1 pipeline: filter, normalize, merge, compute, roll
/// up, format. The daily ledger comes back sorted by (employee, date); the
/// monthly summary is sorted by employee.
pub fn normalize_and_aggregate(
    rows: Vec<RawAttendanceRow>,
    rules: &AttendanceRules,
) -> AttendanceReport {
    let filtered = filter_records(rows, rules);
    let normalized = normalize_times(filtered, rules);
    let merged = merge_daily(normalized);
    let mut days = calculate_hours(merged, rules);
    days.sort_by(|a, b| a.employee.cmp(&b.employee).then(a.date.cmp(&b.date)));

    let monthly = aggregate_monthly(&days, rules);
    let daily: Vec<DailyLedgerRow> = days.iter().map(to_ledger_row).collect();
    info!(
        "Aggregated {} worked days into {} monthly rows",
        daily.len(),
        monthly.len()
    );
    AttendanceReport { monthly, daily }
}
