use crate::bulk::{BulkEvent, BulkSelection};
use crate::coupon::{
    CouponController, CouponSettings, LookupResponse, redeem_by_picker, toggle_duration_in_months,
};
use crate::dates::{DateElement, DateKind, DateRenderer};
use crate::effect::{DomEffect, Effect, dom};
use crate::markup::{PageSnapshot, Target};
use crate::payment::{CardDetails, PaymentController};
use crate::tokenizer::TokenResponse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Which form the browser is about to submit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmittedForm {
    Payment { card: CardDetails },
    Other,
}

/// Everything the page reacts to: user interaction on the markup, plus
/// completions of work started by earlier effects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    ItemChanged { index: usize, checked: bool },
    SelectAllChanged { checked: bool },
    DurationChanged { value: String },
    CouponKeyUp { value: String },
    FormSubmitted { form: SubmittedForm },
    #[serde(skip)]
    CouponLookupCompleted(LookupResponse),
    #[serde(skip)]
    TokenCreated(TokenResponse),
}

#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Used when the markup carries no `csrf-token` meta tag.
    pub csrf_token: Option<String>,
    pub lookup_delay: Duration,
    pub discard_stale_responses: bool,
    pub renderer: DateRenderer,
}

pub struct Page {
    bulk: BulkSelection,
    coupons: CouponController,
    payment: PaymentController,
    renderer: DateRenderer,
    dates: Vec<DateElement>,
}

impl Page {
    /// Build the controllers for a freshly loaded page and the effects that
    /// initialize its markup.
    pub fn load(snapshot: PageSnapshot, settings: PageSettings, now: DateTime<Utc>) -> (Self, Vec<Effect>) {
        let csrf_token = snapshot
            .csrf_token
            .clone()
            .or(settings.csrf_token)
            .unwrap_or_else(|| {
                warn!("No CSRF token on the page, coupon lookups will be rejected");
                String::new()
            });

        let page = Self {
            bulk: BulkSelection::new(snapshot.checkbox_items),
            coupons: CouponController::new(CouponSettings {
                csrf_token,
                lookup_delay: settings.lookup_delay,
                discard_stale_responses: settings.discard_stale_responses,
            }),
            payment: PaymentController::new(),
            renderer: settings.renderer,
            dates: snapshot.dates,
        };

        let mut effects = dom(page.render_dates(now));

        if let Some(duration) = &snapshot.duration {
            effects.push(Effect::Dom(toggle_duration_in_months(duration)));
        }

        if snapshot.has_redeem_by {
            effects.push(Effect::Dom(DomEffect::AttachDatetimePicker {
                target: Target::RedeemBy,
                options: redeem_by_picker(),
            }));
        }

        effects.extend(page.payment.load(snapshot.stripe_key.as_deref()));

        (page, effects)
    }

    /// `(index, datetime)` of every `.from-now` element, for periodic refresh.
    pub fn relative_dates(&self) -> Vec<(usize, String)> {
        self.dates
            .iter()
            .filter(|d| d.kind == DateKind::Relative)
            .enumerate()
            .map(|(index, d)| (index, d.datetime.clone()))
            .collect()
    }

    pub fn renderer(&self) -> DateRenderer {
        self.renderer
    }

    pub fn dispatch(&mut self, event: PageEvent, now: Instant) -> Vec<Effect> {
        debug!(event = ?event, "Dispatching page event");

        match event {
            PageEvent::ItemChanged { index, checked } => {
                self.bulk_changed(BulkEvent::ItemChanged { index, checked })
            }
            PageEvent::SelectAllChanged { checked } => {
                self.bulk_changed(BulkEvent::SelectAllChanged { checked })
            }
            PageEvent::DurationChanged { value } => {
                vec![Effect::Dom(toggle_duration_in_months(&value))]
            }
            PageEvent::CouponKeyUp { value } => dom(self.coupons.key_up(value, now)),
            PageEvent::FormSubmitted {
                form: SubmittedForm::Payment { card },
            } => self.payment.submit(self.coupons.status(), card),
            PageEvent::FormSubmitted {
                form: SubmittedForm::Other,
            } => dom(self.payment.submit_other(self.coupons.status())),
            PageEvent::CouponLookupCompleted(response) => {
                dom(self.coupons.lookup_completed(response))
            }
            PageEvent::TokenCreated(response) => {
                let effects = dom(self.payment.token_created(response));
                debug!(form = ?self.payment.form(), "Payment form after token response");
                effects
            }
        }
    }

    fn bulk_changed(&mut self, event: BulkEvent) -> Vec<Effect> {
        let effects = dom(self.bulk.handle(event));
        debug!(
            checked = self.bulk.checked_count(),
            bulk_actions_visible = self.bulk.bulk_actions_visible(),
            "Bulk selection updated"
        );
        effects
    }

    /// Advance timers: fires the debounced coupon lookup when it is due.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        self.coupons.tick(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.coupons.next_due()
    }

    fn render_dates(&self, now: DateTime<Utc>) -> Vec<DomEffect> {
        let mut relative = 0;
        let mut short = 0;
        let mut effects = Vec::new();

        for date in &self.dates {
            match date.kind {
                DateKind::Relative => {
                    effects.extend(self.renderer.relative_effects(relative, &date.datetime, now));
                    relative += 1;
                }
                DateKind::Short => {
                    effects.extend(self.renderer.short_effects(short, &date.datetime));
                    short += 1;
                }
            }
        }

        effects
    }
}
