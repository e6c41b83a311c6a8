use chrono::{
    DateTime, Datelike, LocalResult, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
};
use tracing::warn;

use crate::error::{GrabError, Result};

/// Unit of an age expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Days,
    Months,
    Years,
}

/// Resolve an age expression such as `"7d"`, `"3m"` or `"1y"` to the
/// absolute point in time that lies that far before `now`.
///
/// A missing or unknown unit is treated as days. Months and years use
/// calendar arithmetic rather than fixed-length approximations.
pub fn resolve_age<Tz: TimeZone>(expr: &str, now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    let (amount, unit) = parse_age(expr)?;
    let unit = unit.unwrap_or_else(|| {
        warn!(
            "Incorrect or missing modifier in 'age' filter '{}', considered as 'day'",
            expr
        );
        AgeUnit::Days
    });

    let cutoff = match unit {
        AgeUnit::Days => TimeDelta::try_days(amount)
            .and_then(|delta| now.clone().checked_sub_signed(delta)),
        AgeUnit::Months => u32::try_from(amount)
            .ok()
            .and_then(|months| {
                now.naive_local()
                    .checked_sub_months(Months::new(months))
            })
            .and_then(|shifted| from_wall_clock(&now.timezone(), shifted)),
        AgeUnit::Years => i32::try_from(amount)
            .ok()
            .and_then(|years| sub_years(now.naive_local(), years))
            .and_then(|shifted| from_wall_clock(&now.timezone(), shifted)),
    };

    cutoff.ok_or_else(|| GrabError::config(format!("Age '{expr}' is out of range")))
}

/// Split an age expression into its amount and unit.
///
/// Leading whitespace and a single `+` are accepted before the amount. The
/// unit is `None` when it is missing or not one of `d`, `m`, `y`.
pub fn parse_age(expr: &str) -> Result<(i64, Option<AgeUnit>)> {
    let trimmed = expr.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());

    let amount = trimmed[..digits_end]
        .parse::<i64>()
        .map_err(|e| GrabError::config(format!("Unrecognized age format '{expr}': {e}")))?;

    let unit = match trimmed[digits_end..].chars().next() {
        Some('d' | 'D') => Some(AgeUnit::Days),
        Some('m' | 'M') => Some(AgeUnit::Months),
        Some('y' | 'Y') => Some(AgeUnit::Years),
        _ => None,
    };

    Ok((amount, unit))
}

fn sub_years(local: NaiveDateTime, years: i32) -> Option<NaiveDateTime> {
    let year = local.year().checked_sub(years)?;

    // Feb 29 has no counterpart in a non-leap year; roll forward to Mar 1.
    local.with_year(year).or_else(|| {
        NaiveDate::from_ymd_opt(year, 3, 1).map(|date| date.and_time(local.time()))
    })
}

/// Map a wall-clock time back onto `tz`.
///
/// A time repeated by a backward transition resolves to its first
/// occurrence. A time skipped by a forward transition is read with the
/// offset in force before the gap, which lands just after it.
fn from_wall_clock<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(time) => Some(time),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let before = local.checked_sub_signed(TimeDelta::days(1))?;
            let offset = tz.from_local_datetime(&before).earliest()?.offset().fix();
            let utc = local
                .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 30, 0).unwrap()
    }

    #[test]
    fn days_subtract_fixed_seconds() {
        let now = at(2024, 3, 10);
        let cutoff = resolve_age("7d", &now).unwrap();
        assert_eq!(now.timestamp() - cutoff.timestamp(), 7 * 86400);

        let upper = resolve_age("2D", &now).unwrap();
        assert_eq!(upper, at(2024, 3, 8));
    }

    #[test]
    fn missing_unit_defaults_to_days() {
        let now = at(2024, 3, 10);
        assert_eq!(resolve_age("3", &now).unwrap(), at(2024, 3, 7));
        assert_eq!(resolve_age("3w", &now).unwrap(), at(2024, 3, 7));
    }

    #[test]
    fn months_use_calendar_arithmetic() {
        let now = at(2024, 5, 15);
        assert_eq!(resolve_age("1m", &now).unwrap(), at(2024, 4, 15));
        assert_eq!(resolve_age("5M", &now).unwrap(), at(2023, 12, 15));
        assert_eq!(resolve_age("14m", &now).unwrap(), at(2023, 3, 15));
        assert_eq!(resolve_age("29m", &now).unwrap(), at(2021, 12, 15));
    }

    #[test]
    fn months_clamp_to_end_of_month() {
        let now = at(2024, 3, 31);
        assert_eq!(resolve_age("1m", &now).unwrap(), at(2024, 2, 29));
    }

    #[test]
    fn years_keep_month_and_day() {
        let now = at(2024, 6, 1);
        assert_eq!(resolve_age("1y", &now).unwrap(), at(2023, 6, 1));
        assert_eq!(resolve_age("10Y", &now).unwrap(), at(2014, 6, 1));
    }

    #[test]
    fn leap_day_rolls_forward() {
        let now = at(2024, 2, 29);
        assert_eq!(resolve_age("1y", &now).unwrap(), at(2023, 3, 1));
        assert_eq!(resolve_age("4y", &now).unwrap(), at(2020, 2, 29));
    }

    #[test]
    fn forward_gap_lands_after_the_transition() {
        use chrono_tz::America::New_York;

        // 2024-03-10 02:30 does not exist in New York.
        let now = New_York.with_ymd_and_hms(2024, 12, 10, 2, 30, 0).unwrap();
        let expected = New_York.with_ymd_and_hms(2024, 3, 10, 3, 30, 0).unwrap();
        assert_eq!(resolve_age("9m", &now).unwrap(), expected);

        let now = New_York.with_ymd_and_hms(2025, 3, 10, 2, 30, 0).unwrap();
        assert_eq!(resolve_age("1y", &now).unwrap(), expected);
    }

    #[test]
    fn repeated_hour_takes_first_occurrence() {
        use chrono_tz::America::New_York;

        // 2024-11-03 01:30 happens twice in New York; the first is EDT.
        let now = New_York.with_ymd_and_hms(2024, 12, 3, 1, 30, 0).unwrap();
        let cutoff = resolve_age("1m", &now).unwrap();
        assert_eq!(
            cutoff.naive_utc(),
            NaiveDate::from_ymd_opt(2024, 11, 3)
                .unwrap()
                .and_hms_opt(5, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn leading_plus_is_accepted() {
        let now = at(2024, 3, 10);
        assert_eq!(parse_age("+7d").unwrap(), (7, Some(AgeUnit::Days)));
        assert_eq!(parse_age(" +2m").unwrap(), (2, Some(AgeUnit::Months)));
        assert_eq!(resolve_age("+2d", &now).unwrap(), at(2024, 3, 8));
        assert!(matches!(parse_age("++2d"), Err(GrabError::Config(_))));
        assert!(matches!(parse_age("-2d"), Err(GrabError::Config(_))));
    }

    #[test]
    fn non_numeric_amount_is_config_error() {
        let now = at(2024, 1, 1);
        assert!(matches!(resolve_age("d", &now), Err(GrabError::Config(_))));
        assert!(matches!(resolve_age("", &now), Err(GrabError::Config(_))));
        assert!(matches!(resolve_age("abc", &now), Err(GrabError::Config(_))));
    }

    #[test]
    fn parse_age_splits_amount_and_unit() {
        assert_eq!(parse_age("12m").unwrap(), (12, Some(AgeUnit::Months)));
        assert_eq!(parse_age("1y").unwrap(), (1, Some(AgeUnit::Years)));
        assert_eq!(parse_age("30").unwrap(), (30, None));
        assert_eq!(parse_age("30x").unwrap(), (30, None));
    }
}
