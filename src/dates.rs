//! Human-readable rendering of `data-datetime` timestamps.
//!
//! `.from-now` elements show relative text ("3 minutes ago") and are
//! refreshed by a [`DateTicker`]; `.short-date` elements are rendered once
//! as `Mar 5th 2016`. Both carry a full-format tooltip.

use crate::effect::{DomEffect, set_text};
use crate::markup::Target;
use crate::util::ordinal;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

pub const INVALID_DATE: &str = "Invalid date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Relative,
    Short,
}

/// A date-bearing element as found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateElement {
    pub kind: DateKind,
    pub datetime: String,
}

/// Parse a timestamp as the server renders it.
///
/// Accepts RFC 3339, Python's `YYYY-MM-DD HH:MM:SS[.f]+HH:MM`, and naive
/// date-times or dates, which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Relative text for `then` as seen from `now`: `3 minutes ago`, `in a day`.
pub fn relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta_ms = (then - now).num_milliseconds();
    let phrase = humanize(delta_ms.unsigned_abs() as f64);

    if delta_ms > 0 {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

fn humanize(ms: f64) -> String {
    let days_exact = ms / 86_400_000.0;
    let seconds = (ms / 1000.0).round();
    let minutes = (ms / 60_000.0).round();
    let hours = (ms / 3_600_000.0).round();
    let days = days_exact.round();
    let months = (days_exact * 4800.0 / 146_097.0).round();
    let years = (days_exact * 400.0 / 146_097.0).round();

    if seconds <= 44.0 {
        "a few seconds".into()
    } else if minutes <= 1.0 {
        "a minute".into()
    } else if minutes < 45.0 {
        format!("{minutes} minutes")
    } else if hours <= 1.0 {
        "an hour".into()
    } else if hours < 22.0 {
        format!("{hours} hours")
    } else if days <= 1.0 {
        "a day".into()
    } else if days < 26.0 {
        format!("{days} days")
    } else if months <= 1.0 {
        "a month".into()
    } else if months < 11.0 {
        format!("{months} months")
    } else if years <= 1.0 {
        "a year".into()
    } else {
        format!("{years} years")
    }
}

/// `March 5th 2016, 1:02:03 pm +00:00`
pub fn full<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} {} {}",
        dt.format("%B"),
        ordinal(dt.day()),
        dt.format("%Y, %-I:%M:%S %P %:z")
    )
}

/// `Mar 5th 2016`
pub fn short<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{} {} {}", dt.format("%b"), ordinal(dt.day()), dt.format("%Y"))
}

/// Renders date elements in a fixed display offset.
#[derive(Debug, Clone, Copy)]
pub struct DateRenderer {
    offset: FixedOffset,
}

impl DateRenderer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn relative_effects(&self, index: usize, raw: &str, now: DateTime<Utc>) -> Vec<DomEffect> {
        let target = Target::FromNow(index);
        match parse_timestamp(raw) {
            Some(then) => vec![
                set_text(target, relative(then, now)),
                self.title(target, &then),
            ],
            None => invalid(target),
        }
    }

    pub fn short_effects(&self, index: usize, raw: &str) -> Vec<DomEffect> {
        let target = Target::ShortDate(index);
        match parse_timestamp(raw) {
            Some(then) => vec![
                set_text(target, short(&then.with_timezone(&self.offset))),
                self.title(target, &then),
            ],
            None => invalid(target),
        }
    }

    fn title(&self, target: Target, then: &DateTime<Utc>) -> DomEffect {
        DomEffect::SetTitle {
            target,
            title: full(&then.with_timezone(&self.offset)),
        }
    }
}

fn invalid(target: Target) -> Vec<DomEffect> {
    vec![
        set_text(target, INVALID_DATE),
        DomEffect::SetTitle {
            target,
            title: INVALID_DATE.into(),
        },
    ]
}

/// Cooperative stop signal shared between an owner and its workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Re-renders one `.from-now` element every `interval` until cancelled.
/// The first render is the caller's; the ticker only refreshes.
pub struct DateTicker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl DateTicker {
    pub fn spawn<F>(
        index: usize,
        datetime: String,
        renderer: DateRenderer,
        interval: Duration,
        token: CancellationToken,
        mut sink: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(Vec<DomEffect>) + Send + 'static,
    {
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name(format!("date-ticker-{index}"))
            .spawn(move || {
                debug!(index, "Date ticker started");
                loop {
                    sleep_unless_cancelled(interval, &worker_token);
                    if worker_token.is_cancelled() {
                        break;
                    }
                    sink(renderer.relative_effects(index, &datetime, Utc::now()));
                }
                debug!(index, "Date ticker stopped");
            })?;

        Ok(Self { token, handle })
    }

    /// Cancel and wait for the worker to exit.
    pub fn stop(self) {
        self.token.cancel();
        if self.handle.join().is_err() {
            error!("Date ticker thread panicked");
        }
    }
}

fn sleep_unless_cancelled(interval: Duration, token: &CancellationToken) {
    let slice = Duration::from_millis(50).min(interval);
    let mut slept = Duration::ZERO;
    while slept < interval && !token.is_cancelled() {
        thread::sleep(slice);
        slept += slice;
    }
}
