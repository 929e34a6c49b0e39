use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

// Sydney standard time. Daylight saving is ignored; the run date only shifts for runs
// between 23:00 and midnight local during summer.
const AEST_OFFSET_SECS: i32 = 10 * 3600;

pub fn resolve_run_date(
    run_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = run_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid run date {s:?}; expected YYYY-MM-DD"));
    }

    let aest = chrono::FixedOffset::east_opt(AEST_OFFSET_SECS).context("invalid AEST offset")?;
    Ok(now_utc.with_timezone(&aest).date_naive())
}

/// One date per week going back from `run_date`, newest first.
///
/// Weekend or holiday dates are not rolled back; the regulator simply has no report for them
/// and that week is skipped by the fetch loop.
pub fn weekly_snapshot_dates(run_date: NaiveDate, weeks: u32) -> Vec<NaiveDate> {
    (0..weeks as i64)
        .map(|k| run_date - Duration::days(7 * k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        let d = resolve_run_date(Some("2025-12-31"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(resolve_run_date(Some("31/12/2025"), now).is_err());
    }

    #[test]
    fn defaults_to_sydney_date() {
        // 2026-01-05 15:00 UTC = 2026-01-06 01:00 AEST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0).unwrap();
        let d = resolve_run_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());

        // 2026-01-05 08:00 UTC = 2026-01-05 18:00 AEST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let d = resolve_run_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn weekly_dates_step_back_seven_days() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let dates = weekly_snapshot_dates(d, 6);
        assert_eq!(dates.len(), 6);
        assert_eq!(dates[0], d);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(dates[5], NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert!(weekly_snapshot_dates(d, 0).is_empty());
    }
}
