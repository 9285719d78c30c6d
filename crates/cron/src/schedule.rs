//! Schedule validation and evaluation.

use std::str::FromStr;

use {
    chrono::{DateTime, Local, TimeDelta, TimeZone, Utc},
    chrono_tz::Tz,
    tracing::warn,
};

use crate::{
    error::{CronError, Result},
    types::{CronJob, CronSchedule},
};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Reject schedules that can never fire or cannot be parsed.
pub fn validate(schedule: &CronSchedule) -> Result<()> {
    match schedule {
        CronSchedule::At { .. } => Ok(()),
        CronSchedule::Every { interval_ms } => {
            if *interval_ms == 0 {
                return Err(CronError::InvalidSchedule(
                    "intervalMs must be greater than zero".into(),
                ));
            }
            Ok(())
        },
        CronSchedule::Cron { expression, tz } => {
            parse_expression(expression)?;
            if let Some(tz) = tz {
                parse_tz(tz)?;
            }
            Ok(())
        },
    }
}

/// Turn a standard 5-field expression into the 6-field form the `cron`
/// crate parses: a zero seconds field is prepended and numeric day-of-week
/// values (0-7, Sunday = 0 or 7) become day names.
///
/// When both day-of-month and day-of-week are restricted, classic cron fires
/// on either match while the `cron` crate requires both, so two schedules are
/// returned, one per day field, and the earlier occurrence wins.
pub fn normalize_expression(expression: &str) -> Result<Vec<String>> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
        return Err(CronError::InvalidSchedule(format!(
            "expected 5 fields in {expression:?}, found {}",
            fields.len()
        )));
    };
    let both_days_restricted = is_restricted(day_of_month) && is_restricted(day_of_week);
    let day_of_week = normalize_day_of_week(day_of_week)?;
    if both_days_restricted {
        return Ok(vec![
            format!("0 {minute} {hour} {day_of_month} {month} *"),
            format!("0 {minute} {hour} * {month} {day_of_week}"),
        ]);
    }
    Ok(vec![format!(
        "0 {minute} {hour} {day_of_month} {month} {day_of_week}"
    )])
}

/// A day field starting with `*` counts as unrestricted, `*/2` included.
fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

fn normalize_day_of_week(field: &str) -> Result<String> {
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }
    let mut out: Vec<String> = Vec::new();
    for item in field.split(',') {
        for day in day_of_week_item(item)? {
            if !out.contains(&day) {
                out.push(day);
            }
        }
    }
    Ok(out.join(","))
}

fn day_of_week_item(item: &str) -> Result<Vec<String>> {
    let invalid = || CronError::InvalidSchedule(format!("invalid day-of-week {item:?}"));

    // Named days are left for the cron parser.
    if item.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(vec![item.to_ascii_uppercase()]);
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().map_err(|_| invalid())?)),
        None => (item, None),
    };
    let day = |raw: &str| -> Result<usize> {
        raw.parse::<usize>()
            .ok()
            .filter(|d| *d <= 7)
            .ok_or_else(invalid)
    };
    let (from, to) = match (range, range.split_once('-')) {
        ("*", _) => (0, 7),
        (_, Some((from, to))) => (day(from)?, day(to)?),
        (single, None) if step.is_some() => (day(single)?, 7),
        (single, None) => {
            let d = day(single)?;
            (d, d)
        },
    };
    let step = step.unwrap_or(1);
    if from > to || step == 0 {
        return Err(invalid());
    }
    Ok((from..=to)
        .step_by(step)
        .map(|d| DAY_NAMES[d % 7].to_string())
        .collect())
}

fn parse_expression(expression: &str) -> Result<Vec<cron::Schedule>> {
    normalize_expression(expression)?
        .iter()
        .map(|normalized| {
            cron::Schedule::from_str(normalized)
                .map_err(|e| CronError::InvalidSchedule(format!("{expression:?}: {e}")))
        })
        .collect()
}

fn parse_tz(tz: &str) -> Result<Tz> {
    tz.parse::<Tz>()
        .map_err(|_| CronError::InvalidSchedule(format!("unknown time zone {tz:?}")))
}

/// First occurrence strictly after `after`, evaluated in `tz` (host local
/// time when `None`).
fn next_occurrence(
    expression: &str,
    tz: Option<&str>,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let schedules = parse_expression(expression)?;
    Ok(match tz {
        Some(tz) => first_after(&schedules, &parse_tz(tz)?, after),
        None => first_after(&schedules, &Local, after),
    })
}

fn first_after<Z: TimeZone>(
    schedules: &[cron::Schedule],
    tz: &Z,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let local = after.with_timezone(tz);
    schedules
        .iter()
        .filter_map(|schedule| schedule.after(&local).next())
        .map(|at| at.with_timezone(&Utc))
        .min()
}

/// The instant `job` is next due, counted from its anchor. `None` when it
/// will never fire again (a fired one-shot, a bad expression).
fn due_at(job: &CronJob) -> Option<DateTime<Utc>> {
    match &job.schedule {
        CronSchedule::At { date } => job.last_fired_at.is_none().then_some(*date),
        CronSchedule::Every { interval_ms } => {
            let interval = TimeDelta::milliseconds(i64::try_from(*interval_ms).ok()?);
            (*interval_ms > 0)
                .then(|| job.anchor().checked_add_signed(interval))
                .flatten()
        },
        CronSchedule::Cron { expression, tz } => {
            match next_occurrence(expression, tz.as_deref(), job.anchor()) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "cannot evaluate cron schedule");
                    None
                },
            }
        },
    }
}

/// Whether an enabled job should fire at `now`.
pub fn is_due(job: &CronJob, now: DateTime<Utc>) -> bool {
    job.enabled && due_at(job).is_some_and(|at| at <= now)
}

/// When an enabled job would next fire, never earlier than `now`.
pub fn next_fire(job: &CronJob, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !job.enabled {
        return None;
    }
    due_at(job).map(|at| at.max(now))
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn job(schedule: CronSchedule, created_at: &str) -> CronJob {
        CronJob {
            id: "j".into(),
            label: "l".into(),
            task: "t".into(),
            schedule,
            enabled: true,
            created_at: utc(created_at),
            last_fired_at: None,
        }
    }

    #[rstest]
    #[case::every_field_wild("* * * * *", "0 * * * * *")]
    #[case::sunday_zero("30 8 * * 0", "0 30 8 * * SUN")]
    #[case::sunday_seven("30 8 * * 7", "0 30 8 * * SUN")]
    #[case::weekdays("0 9 * * 1-5", "0 0 9 * * MON,TUE,WED,THU,FRI")]
    #[case::wrapping_to_seven("0 9 * * 5-7", "0 0 9 * * FRI,SAT,SUN")]
    #[case::stepped("0 0 * * */2", "0 0 0 * * SUN,TUE,THU,SAT")]
    #[case::single_day_stepped("0 0 * * 5/2", "0 0 0 * * FRI,SUN")]
    #[case::list_dedup("0 0 * * 0,7,3", "0 0 0 * * SUN,WED")]
    #[case::names_untouched("15 6 * * mon-fri", "0 15 6 * * MON-FRI")]
    #[case::stepped_month_day("0 0 */2 * 1", "0 0 0 */2 * MON")]
    #[case::stepped_week_day("0 0 15 * */3", "0 0 0 15 * SUN,WED,SAT")]
    fn normalizes_five_field_expressions(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_expression(input).unwrap(), vec![expected.to_string()]);
    }

    #[rstest]
    #[case::first_or_monday("0 0 1 * 1", "0 0 0 1 * *", "0 0 0 * * MON")]
    #[case::thirteenth_or_friday("0 0 13 * 5", "0 0 0 13 * *", "0 0 0 * * FRI")]
    fn splits_when_both_day_fields_are_restricted(
        #[case] input: &str,
        #[case] by_month_day: &str,
        #[case] by_week_day: &str,
    ) {
        assert_eq!(
            normalize_expression(input).unwrap(),
            vec![by_month_day.to_string(), by_week_day.to_string()]
        );
    }

    #[rstest]
    #[case::monday_before_the_first("0 0 1 * 1", "2026-03-02T00:00:01Z", "2026-03-09T00:00:00Z")]
    #[case::friday_before_the_thirteenth("0 0 13 * 5", "2026-03-02T00:00:01Z", "2026-03-06T00:00:00Z")]
    #[case::month_day_before_monday("0 0 29 * 1", "2026-03-28T12:00:00Z", "2026-03-29T00:00:00Z")]
    fn either_day_field_matches(#[case] expression: &str, #[case] created: &str, #[case] next: &str) {
        let schedule = CronSchedule::Cron {
            expression: expression.into(),
            tz: Some("UTC".into()),
        };
        let cron = job(schedule, created);
        assert_eq!(next_fire(&cron, utc(created)), Some(utc(next)));
    }

    #[rstest]
    #[case::too_few("* * * *")]
    #[case::too_many("0 * * * * *")]
    #[case::bad_day("0 0 * * 8")]
    #[case::backwards_range("0 0 * * 5-2")]
    #[case::bad_minute("61 * * * *")]
    fn rejects_bad_expressions(#[case] expression: &str) {
        assert!(matches!(
            validate(&CronSchedule::cron(expression)),
            Err(CronError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn validates_interval_and_zone() {
        assert!(validate(&CronSchedule::every_ms(0)).is_err());
        assert!(validate(&CronSchedule::every_ms(1)).is_ok());
        assert!(validate(&CronSchedule::Cron {
            expression: "0 9 * * *".into(),
            tz: Some("Europe/Berlin".into()),
        })
        .is_ok());
        assert!(validate(&CronSchedule::Cron {
            expression: "0 9 * * *".into(),
            tz: Some("Mars/Olympus".into()),
        })
        .is_err());
    }

    #[test]
    fn one_shot_is_due_once() {
        let now = utc("2026-03-01T12:00:00Z");
        let mut at = job(CronSchedule::at(now - TimeDelta::seconds(1)), "2026-03-01T11:00:00Z");
        assert!(is_due(&at, now));
        at.last_fired_at = Some(now);
        assert!(!is_due(&at, now + TimeDelta::hours(1)));
        assert_eq!(next_fire(&at, now), None);
    }

    #[test]
    fn every_counts_from_the_last_firing() {
        let now = utc("2026-03-01T12:00:00Z");
        let mut every = job(CronSchedule::every_ms(5000), "2026-03-01T11:00:00Z");
        every.last_fired_at = Some(now - TimeDelta::milliseconds(6000));
        assert!(is_due(&every, now));
        every.last_fired_at = Some(now - TimeDelta::milliseconds(2000));
        assert!(!is_due(&every, now));
        assert_eq!(
            next_fire(&every, now),
            Some(now + TimeDelta::milliseconds(3000))
        );
    }

    #[test]
    fn cron_uses_the_next_occurrence_after_the_anchor() {
        let every_five = CronSchedule::Cron {
            expression: "*/5 * * * *".into(),
            tz: Some("UTC".into()),
        };
        let mut cron = job(every_five, "2026-03-01T12:00:30Z");
        assert!(!is_due(&cron, utc("2026-03-01T12:04:59Z")));
        assert!(is_due(&cron, utc("2026-03-01T12:05:00Z")));

        cron.last_fired_at = Some(utc("2026-03-01T12:05:00Z"));
        assert!(!is_due(&cron, utc("2026-03-01T12:07:00Z")));
        assert_eq!(
            next_fire(&cron, utc("2026-03-01T12:07:00Z")),
            Some(utc("2026-03-01T12:10:00Z"))
        );
    }

    #[test]
    fn cron_honours_the_time_zone() {
        let nine_in_tokyo = CronSchedule::Cron {
            expression: "0 9 * * *".into(),
            tz: Some("Asia/Tokyo".into()),
        };
        let cron = job(nine_in_tokyo, "2026-03-01T00:30:00Z");
        assert_eq!(
            next_fire(&cron, utc("2026-03-01T00:30:00Z")),
            Some(utc("2026-03-02T00:00:00Z"))
        );
    }

    #[test]
    fn disabled_jobs_are_never_due() {
        let now = utc("2026-03-01T12:00:00Z");
        let mut at = job(CronSchedule::at(now), "2026-03-01T11:00:00Z");
        at.enabled = false;
        assert!(!is_due(&at, now));
        assert_eq!(next_fire(&at, now), None);
    }
}
