//! Timezone-aware daily schedules
//!
//! The rollover and cleanup jobs fire at fixed local times with seconds
//! precision. Instead of a cron dependency the next occurrence is computed
//! directly in the configured zone and slept to; the task re-computes after
//! every run, so DST shifts move the firing time with the zone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeZone};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Next occurrence of `at` (hour, minute, second) local time, strictly after
/// `now`.
pub(crate) fn next_run(now: DateTime<Tz>, at: (u32, u32, u32)) -> DateTime<Tz> {
    let (hour, min, sec) = at;
    let time = NaiveTime::from_hms_opt(hour, min, sec)
        .unwrap_or(NaiveTime::MIN);

    let mut date = now.date_naive();
    loop {
        let candidate = match now.timezone().from_local_datetime(&date.and_time(time)) {
            LocalResult::Single(dt) => Some(dt),
            // Fall-back transition: the earlier instant keeps the schedule daily.
            LocalResult::Ambiguous(earlier, _) => Some(earlier),
            // Spring-forward gap: the local time does not exist that day.
            LocalResult::None => None,
        };
        if let Some(candidate) = candidate {
            if candidate > now {
                return candidate;
            }
        }
        date = match date.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now + chrono::Duration::days(1),
        };
    }
}

/// Spawn a task running `job` every day at the given local time until the
/// token cancels.
pub fn spawn_daily<F>(
    tz: Tz,
    clock: Arc<dyn Clock>,
    at: (u32, u32, u32),
    cancel: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = clock.now_utc().with_timezone(&tz);
            let target = next_run(now, at);
            let wait = (target - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            job();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn zone() -> Tz {
        "Asia/Shanghai".parse().unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let now = zone().with_ymd_and_hms(2025, 3, 10, 22, 15, 0).unwrap();
        let next = next_run(now, (23, 0, 0));
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!((next.hour(), next.minute(), next.second()), (23, 0, 0));
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        let now = zone().with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let next = next_run(now, (0, 0, 0));
        assert_eq!(
            next.date_naive(),
            now.date_naive().succ_opt().unwrap(),
            "a run scheduled exactly now must wait a full day"
        );
    }

    #[test]
    fn test_next_run_one_oclock_sweep() {
        let now = zone().with_ymd_and_hms(2025, 6, 1, 1, 0, 1).unwrap();
        let next = next_run(now, (1, 0, 0));
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
        assert_eq!(next.hour(), 1);
    }

    #[test]
    fn test_next_run_skips_spring_forward_gap() {
        // America/New_York 2025-03-09: 02:30 local does not exist.
        let tz: Tz = "America/New_York".parse().unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 9, 1, 0, 0).unwrap();
        let next = next_run(now, (2, 30, 0));
        assert!(next > now);
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
    }
}
