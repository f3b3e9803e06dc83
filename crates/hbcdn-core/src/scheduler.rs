//! Periodic execution of the reconciler.
//!
//! One loop, one job: a cycle runs, the next fire is computed, and the sleep
//! polls the shutdown flag. Overlap is impossible by construction; the file
//! lock in the reconciler is the second line of defense. Missed fires
//! coalesce into the next one.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug)]
pub enum Schedule {
    Interval(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Cron wins over the interval when a non-empty expression is configured.
    pub fn from_settings(interval_seconds: u64, cron_expression: &str) -> Result<Self> {
        let cron_expression = cron_expression.trim();
        if cron_expression.is_empty() {
            Ok(Schedule::Interval(Duration::from_secs(
                interval_seconds.max(1),
            )))
        } else {
            Ok(Schedule::Cron(Box::new(parse_cron(cron_expression)?)))
        }
    }

    /// Delay until the next fire, measured from now.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        match self {
            Schedule::Interval(interval) => *interval,
            Schedule::Cron(schedule) => schedule
                .upcoming(Utc)
                .next()
                .and_then(|next| (next - Utc::now()).to_std().ok())
                .unwrap_or_else(|| Duration::from_secs(1)),
        }
    }
}

/// Parse a classic 5-field cron expression (minute precision).
pub fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        anyhow::bail!(
            "cron expression must have 5 fields, got {} in {expression:?}",
            fields.len()
        );
    }
    // The cron crate wants a seconds field; pin it to zero.
    let with_seconds = format!("0 {expression}");
    cron::Schedule::from_str(&with_seconds)
        .with_context(|| format!("invalid cron expression {expression:?}"))
}

/// Run `job` on `schedule` until `shutdown` is raised.
///
/// The first cycle runs immediately; signal-driven shutdown interrupts only
/// the sleep, never a running cycle.
pub fn run_scheduler<F>(schedule: &Schedule, shutdown: &AtomicBool, mut job: F)
where
    F: FnMut(),
{
    info!("scheduler started");
    while !shutdown.load(Ordering::SeqCst) {
        job();

        let deadline = Instant::now() + schedule.next_delay();
        debug!("next cycle in {:?}", schedule.next_delay());
        while Instant::now() < deadline {
            if shutdown.load(Ordering::SeqCst) {
                info!("scheduler stopping");
                return;
            }
            thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
    info!("scheduler stopping");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_cron("*/5 * * * *").is_ok());
        assert!(parse_cron("0 3 * * 1").is_ok());
        assert!(parse_cron("* * * *").is_err());
        assert!(parse_cron("not a cron at all").is_err());
        assert!(parse_cron("0 0 * * * *").is_err());
    }

    #[test]
    fn cron_overrides_interval() -> Result<()> {
        let schedule = Schedule::from_settings(30, "*/5 * * * *")?;
        assert!(matches!(schedule, Schedule::Cron(_)));

        let schedule = Schedule::from_settings(30, "  ")?;
        match schedule {
            Schedule::Interval(interval) => assert_eq!(interval, Duration::from_secs(30)),
            Schedule::Cron(_) => panic!("expected interval"),
        }
        Ok(())
    }

    #[test]
    fn cron_next_delay_is_bounded_by_a_minute_grid() -> Result<()> {
        let schedule = Schedule::from_settings(30, "* * * * *")?;
        assert!(schedule.next_delay() <= Duration::from_secs(61));
        Ok(())
    }

    #[test]
    fn shutdown_interrupts_the_sleep() {
        let shutdown = AtomicBool::new(false);
        let runs = AtomicUsize::new(0);
        let schedule = Schedule::Interval(Duration::from_secs(3600));

        let started = Instant::now();
        run_scheduler(&schedule, &shutdown, || {
            runs.fetch_add(1, Ordering::SeqCst);
            shutdown.store(true, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
