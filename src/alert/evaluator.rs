/// Sustained-icing alert evaluation.
///
/// Looks ahead over the classified forecast column and decides whether a
/// notification should go out now. The rule is deliberately coarse: three
/// consecutive forecast hours of any icing type inside the next twelve
/// hours, with at most one alert per site every six hours.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::config::SiteSpec;
use crate::model::{AlertCooldownRecord, IcingType, Series, SourceGroup, Timestamp, COL_ICING};

/// Window, run length and cooldown used by `evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub window_hours: i64,
    pub run_length: usize,
    pub cooldown_hours: i64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            window_hours: 12,
            run_length: 3,
            cooldown_hours: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Condition raised and no alert inside the cooldown; `now` becomes the
    /// new cooldown timestamp.
    Send { now: NaiveDateTime, run_start: Timestamp },
    /// Condition raised but an alert already went out recently.
    SuppressedByCooldown { last_alert: NaiveDateTime, run_start: Timestamp },
    NoAlert,
}

impl AlertDecision {
    /// The cooldown record to persist after a `Send`.
    pub fn new_cooldown(&self, site_id: &str) -> Option<AlertCooldownRecord> {
        match self {
            AlertDecision::Send { now, .. } => Some(AlertCooldownRecord {
                site_id: site_id.to_string(),
                last_alert: *now,
            }),
            _ => None,
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(self, AlertDecision::Send { .. })
    }
}

/// Evaluates the default policy against the `FCST_Icing` column.
pub fn evaluate(
    series: &Series,
    spec: &SiteSpec,
    cooldown: Option<&AlertCooldownRecord>,
    now_utc: DateTime<Utc>,
) -> AlertDecision {
    evaluate_with_policy(series, spec, cooldown, now_utc, &AlertPolicy::default())
}

pub fn evaluate_with_policy(
    series: &Series,
    spec: &SiteSpec,
    cooldown: Option<&AlertCooldownRecord>,
    now_utc: DateTime<Utc>,
    policy: &AlertPolicy,
) -> AlertDecision {
    let now = spec.to_local(now_utc);
    let window_end = now + Duration::hours(policy.window_hours);

    let Some(run_start) = first_icing_run(series, now, window_end, policy.run_length) else {
        return AlertDecision::NoAlert;
    };

    match cooldown {
        Some(record) if now - record.last_alert < Duration::hours(policy.cooldown_hours) => {
            AlertDecision::SuppressedByCooldown { last_alert: record.last_alert, run_start }
        }
        _ => AlertDecision::Send { now, run_start },
    }
}

/// Start of the first run of `run_length` consecutive icing rows with
/// `start <= ts <= end`. Rows without a verdict count as NO ICE.
pub fn first_icing_run(
    series: &Series,
    start: NaiveDateTime,
    end: NaiveDateTime,
    run_length: usize,
) -> Option<Timestamp> {
    if run_length == 0 {
        return None;
    }
    let column = SourceGroup::Forecast.column(COL_ICING);
    let mut streak = 0usize;
    let mut streak_start = None;

    for (ts, row) in series.range(start, end) {
        let hit = row
            .label(&column)
            .and_then(IcingType::from_label)
            .is_some_and(|t| t.is_icing());
        if hit {
            if streak == 0 {
                streak_start = Some(*ts);
            }
            streak += 1;
            if streak >= run_length {
                return streak_start;
            }
        } else {
            streak = 0;
        }
    }
    None
}
