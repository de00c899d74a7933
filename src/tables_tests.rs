// src/tables_tests.rs

#[cfg(test)]
mod tests {
    use crate::attendance::{normalize_and_aggregate, AttendanceRules, EngineError};
    use crate::tables::*;
    use chrono::NaiveDate;

    const RAW_SHEET: &str = "\
이름,조직,직급,근무유형,휴가시간,날짜,시작시각,종료시각
김철수,개발1팀,사원,통상근무,,2024-03-04,09:00,18:00
김철수,개발1팀,사원,통상근무,,2024-03-04,13:00,19:30
이영희,개발1팀,대리,통상근무,8:00,2024-03-04,,
";

    #[test]
    fn raw_sheet_rows_are_bound_by_header_name() {
        let rows = read_raw_rows(RAW_SHEET.as_bytes()).expect("raw sheet reads");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].employee, "김철수");
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(rows[0].start.as_deref(), Some("09:00"));
        assert_eq!(rows[2].leave_type, "8:00");
        assert_eq!(rows[2].start, None, "empty cells come back absent");
    }

    #[test]
    fn missing_required_column_fails_the_batch() {
        let sheet = "이름,조직,직급,근무유형,휴가시간,날짜,시작시각\n김철수,개발1팀,사원,통상근무,,2024-03-04,09:00\n";
        let error = read_raw_rows(sheet.as_bytes()).expect_err("missing 종료시각 must fail");
        assert_eq!(
            error.downcast_ref::<EngineError>(),
            Some(&EngineError::MissingColumn {
                column: "종료시각".to_string()
            })
        );
    }

    #[test]
    fn unreadable_date_cells_drop_the_row_only() {
        let sheet = "\
이름,조직,직급,근무유형,휴가시간,날짜,시작시각,종료시각
김철수,개발1팀,사원,통상근무,,삼월사일,09:00,18:00
이영희,개발1팀,대리,통상근무,,2024-03-04,09:00,18:00
";
        let rows = read_raw_rows(sheet.as_bytes()).expect("batch survives a bad date cell");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].employee, "이영희");
    }

    #[test]
    fn ledger_sheet_round_trips_without_the_raw_minute_column() {
        let rows = read_raw_rows(RAW_SHEET.as_bytes()).expect("raw sheet reads");
        let report = normalize_and_aggregate(rows, &AttendanceRules::default());

        let mut sheet = Vec::new();
        write_table(&mut sheet, &LEDGER_COLUMNS, &report.daily).expect("ledger writes");
        let header = String::from_utf8(sheet.clone()).unwrap();
        assert!(
            header.starts_with("이름,조직,직급,날짜,시작시각,종료시각,지각,기본근무시간,총근무시간"),
            "column order is the sheet contract, got: {}",
            header.lines().next().unwrap_or("")
        );

        let reread = read_daily_ledger(sheet.as_slice()).expect("ledger reads back");
        assert_eq!(reread.len(), report.daily.len());
        assert_eq!(reread[0].total, report.daily[0].total);
        assert_eq!(
            reread[0].total_minutes, None,
            "the raw minute count is engine-internal, not a sheet column"
        );
    }

    #[test]
    fn monthly_sheet_uses_the_fixed_column_order() {
        let rows = read_raw_rows(RAW_SHEET.as_bytes()).expect("raw sheet reads");
        let report = normalize_and_aggregate(rows, &AttendanceRules::default());
        let mut sheet = Vec::new();
        write_table(&mut sheet, &MONTHLY_COLUMNS, &report.monthly).expect("summary writes");
        let header = String::from_utf8(sheet).unwrap();
        assert!(header.starts_with("이름,조직,직급,일수,총근무시간,기본근무시간,연장,지각횟수"));
    }

    #[test]
    fn empty_tables_still_carry_their_header_row() {
        // A weekend-only export legitimately produces empty outputs; the
        // sheets must keep the contract header so `reconcile` can read the
        // ledger back.
        let sheet = "\
이름,조직,직급,근무유형,휴가시간,날짜,시작시각,종료시각
김철수,개발1팀,사원,통상근무,,2024-03-02,09:00,18:00
";
        let rows = read_raw_rows(sheet.as_bytes()).expect("raw sheet reads");
        let report = normalize_and_aggregate(rows, &AttendanceRules::default());
        assert!(report.daily.is_empty());

        let mut ledger_sheet = Vec::new();
        write_table(&mut ledger_sheet, &LEDGER_COLUMNS, &report.daily).expect("ledger writes");
        let written = String::from_utf8(ledger_sheet.clone()).unwrap();
        assert_eq!(
            written.trim_end(),
            "이름,조직,직급,날짜,시작시각,종료시각,지각,기본근무시간,총근무시간",
            "an empty ledger sheet is a lone header row, not a zero-byte file"
        );

        let reread = read_daily_ledger(ledger_sheet.as_slice()).expect("empty ledger reads back");
        assert!(reread.is_empty());

        let mut monthly_sheet = Vec::new();
        write_table(&mut monthly_sheet, &MONTHLY_COLUMNS, &report.monthly)
            .expect("summary writes");
        assert!(
            String::from_utf8(monthly_sheet)
                .unwrap()
                .starts_with("이름,조직,직급,일수"),
            "an empty monthly sheet keeps its header too"
        );
    }

    #[test]
    fn application_sheet_reads_with_required_columns() {
        let sheet = "\
문서번호,이름,근무유형,신청일,상태
A-1,김철수,야간근무,2024-03-01,상신
";
        let rows = read_applications(sheet.as_bytes()).expect("application sheet reads");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, "A-1");
        assert_eq!(
            rows[0].application_day(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );

        let missing = "문서번호,이름,근무유형,신청일\nA-1,김철수,야간근무,2024-03-01\n";
        let error = read_applications(missing.as_bytes()).expect_err("missing 상태 must fail");
        assert_eq!(
            error.downcast_ref::<EngineError>(),
            Some(&EngineError::MissingColumn {
                column: "상태".to_string()
            })
        );
    }
}
