//! Coupon presentation: discount phrasing, the duration field toggle, and
//! the debounced code lookup that drives `#coupon_code_status`.

use crate::debounce::Debouncer;
use crate::effect::{
    Command, DomEffect, Effect, PickerOptions, add_class, hide, remove_class, set_text, show,
};
use crate::markup::{STATUS_ERROR_CLASS, STATUS_SUCCESS_CLASS, STATUS_WARNING_CLASS, Target};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

pub const REPEATING: &str = "repeating";
pub const REDEEM_BY_FORMAT: &str = "YYYY-MM-DD HH:mm:ss";
pub const LOOKUP_UNAVAILABLE: &str = "Coupon code could not be checked right now.";

/// The `data` object of a successful lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CouponDetails {
    #[serde(default)]
    pub percent_off: Option<u32>,
    /// Dollars, not cents.
    #[serde(default)]
    pub amount_off: Option<f64>,
    pub duration: String,
    #[serde(default)]
    pub duration_in_months: Option<u32>,
}

impl CouponDetails {
    /// `"20% off forever"`, `"$5 off for 3 months"`
    pub fn describe(&self) -> String {
        format!(
            "{} off{}",
            format_amount(self.percent_off, self.amount_off),
            format_duration(&self.duration, self.duration_in_months)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(CouponDetails),
    Failed { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupResponse {
    pub seq: u64,
    pub outcome: LookupOutcome,
}

/// A non-zero percentage wins; otherwise the dollar amount.
pub fn format_amount(percent_off: Option<u32>, amount_off: Option<f64>) -> String {
    match percent_off {
        Some(percent) if percent != 0 => format!("{percent}%"),
        _ => format!("${}", amount_off.unwrap_or(0.0)),
    }
}

pub fn format_duration(duration: &str, duration_in_months: Option<u32>) -> String {
    match duration {
        "forever" => " forever".into(),
        "once" => " first payment".into(),
        _ => format!(" for {} months", duration_in_months.unwrap_or(0)),
    }
}

/// Show `#duration-in-months` only for repeating coupons.
pub fn toggle_duration_in_months(duration: &str) -> DomEffect {
    if duration == REPEATING {
        show(Target::DurationInMonths)
    } else {
        hide(Target::DurationInMonths)
    }
}

/// Date-time picker settings for the `#redeem_by` field.
pub fn redeem_by_picker() -> PickerOptions {
    let icons = [
        ("time", "fa fa-clock-o"),
        ("date", "fa fa-calendar"),
        ("up", "fa fa-arrow-up"),
        ("down", "fa fa-arrow-down"),
        ("previous", "fa fa-chevron-left"),
        ("next", "fa fa-chevron-right"),
        ("clear", "fa fa-trash"),
    ];

    PickerOptions {
        widget_parent: ".dt".into(),
        format: REDEEM_BY_FORMAT.into(),
        icons: icons
            .iter()
            .map(|(slot, class)| (slot.to_string(), class.to_string()))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStyle {
    Success,
    Warning,
    Error,
}

impl StatusStyle {
    pub fn class(&self) -> &'static str {
        match self {
            StatusStyle::Success => STATUS_SUCCESS_CLASS,
            StatusStyle::Warning => STATUS_WARNING_CLASS,
            StatusStyle::Error => STATUS_ERROR_CLASS,
        }
    }

    fn for_failure(status: u16) -> Self {
        if status == 404 {
            StatusStyle::Warning
        } else {
            StatusStyle::Error
        }
    }
}

/// What `#coupon_code_status` currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouponStatus {
    pub visible: bool,
    pub text: String,
    pub style: Option<StatusStyle>,
}

impl CouponStatus {
    /// A visible status without the success style means the typed code is
    /// known to be bad.
    pub fn blocks_submission(&self) -> bool {
        self.visible && self.style != Some(StatusStyle::Success)
    }
}

#[derive(Debug, Clone)]
pub struct CouponSettings {
    pub csrf_token: String,
    pub lookup_delay: Duration,
    pub discard_stale_responses: bool,
}

/// Debounced lookup of the code typed into `#coupon_code`.
#[derive(Debug)]
pub struct CouponController {
    csrf_token: String,
    discard_stale_responses: bool,
    debouncer: Debouncer<String>,
    status: CouponStatus,
    next_seq: u64,
}

impl CouponController {
    pub fn new(settings: CouponSettings) -> Self {
        Self {
            csrf_token: settings.csrf_token,
            discard_stale_responses: settings.discard_stale_responses,
            debouncer: Debouncer::new(settings.lookup_delay),
            status: CouponStatus::default(),
            next_seq: 0,
        }
    }

    pub fn status(&self) -> &CouponStatus {
        &self.status
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.debouncer.next_due()
    }

    pub fn key_up(&mut self, code: String, now: Instant) -> Vec<DomEffect> {
        if code.is_empty() {
            if self.debouncer.cancel() {
                debug!("Coupon field cleared, pending lookup cancelled");
            }
            self.status.visible = false;
            return vec![hide(Target::CouponCodeStatus)];
        }

        self.debouncer.schedule(now, code);
        Vec::new()
    }

    /// Issue the lookup once the typing pause has elapsed.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let Some(code) = self.debouncer.poll(now) else {
            return Vec::new();
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        debug!(seq, delay_ms = self.debouncer.delay().as_millis() as u64, "Looking up coupon code");

        let mut effects: Vec<Effect> = self.clear_status().into_iter().map(Effect::Dom).collect();
        effects.push(Effect::Command(Command::LookupCoupon {
            seq,
            code,
            csrf_token: self.csrf_token.clone(),
        }));
        effects
    }

    pub fn lookup_completed(&mut self, response: LookupResponse) -> Vec<DomEffect> {
        if self.discard_stale_responses && response.seq < self.next_seq {
            debug!(
                seq = response.seq,
                latest = self.next_seq,
                "Dropping stale coupon lookup response"
            );
            return Vec::new();
        }

        let (style, text) = match response.outcome {
            LookupOutcome::Found(details) => (StatusStyle::Success, details.describe()),
            LookupOutcome::Failed { status, message } => (StatusStyle::for_failure(status), message),
        };

        self.status = CouponStatus {
            visible: true,
            text: text.clone(),
            style: Some(style),
        };

        vec![
            add_class(Target::CouponCodeStatus, style.class()),
            set_text(Target::CouponCodeStatus, text),
            show(Target::CouponCodeStatus),
        ]
    }

    fn clear_status(&mut self) -> Vec<DomEffect> {
        self.status = CouponStatus::default();
        let target = Target::CouponCodeStatus;
        vec![
            set_text(target, ""),
            remove_class(target, STATUS_SUCCESS_CLASS),
            remove_class(target, STATUS_WARNING_CLASS),
            remove_class(target, STATUS_ERROR_CLASS),
            hide(target),
        ]
    }
}
