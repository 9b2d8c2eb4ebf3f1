//! The payment form: local validation, card tokenization, and resubmission
//! with the token in a hidden field.

use crate::coupon::CouponStatus;
use crate::effect::{Command, DomEffect, Effect, hide, set_text, show};
use crate::markup::Target;
use crate::tokenizer::{TOKENIZER_UNAVAILABLE, TokenResponse};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

pub const MISSING_NAME: &str = "You must enter your name.";
pub const TOKEN_FIELD: &str = "stripe_token";

/// Card fields collected from the payment form.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CardDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub exp_month: String,
    #[serde(default)]
    pub exp_year: String,
    #[serde(default)]
    pub cvc: String,
}

impl CardDetails {
    /// Form-encoded field names expected by the tokenization service.
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("card[name]", self.name.as_str()),
            ("card[number]", self.number.as_str()),
            ("card[exp_month]", self.exp_month.as_str()),
            ("card[exp_year]", self.exp_year.as_str()),
            ("card[cvc]", self.cvc.as_str()),
        ]
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last4 = self
            .number
            .get(self.number.len().saturating_sub(4)..)
            .unwrap_or_default();
        f.debug_struct("CardDetails")
            .field("name", &"***")
            .field("number", &format!("****{last4}"))
            .field("exp_month", &"**")
            .field("exp_year", &"****")
            .field("cvc", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentForm {
    pub spinner_visible: bool,
    pub submit_disabled: bool,
    pub error: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Default)]
pub struct PaymentController {
    form: PaymentForm,
}

impl PaymentController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &PaymentForm {
        &self.form
    }

    /// Hand a non-empty `#stripe_key` to the tokenizer.
    pub fn load(&self, stripe_key: Option<&str>) -> Vec<Effect> {
        match stripe_key.map(str::trim) {
            Some(key) if !key.is_empty() => vec![Effect::Command(Command::SetPublishableKey {
                key: key.to_string(),
            })],
            _ => Vec::new(),
        }
    }

    /// Intercept submission of `#payment_form`. Native submission is always
    /// suppressed; the form is resubmitted once a token arrives.
    pub fn submit(&mut self, coupon: &CouponStatus, card: CardDetails) -> Vec<Effect> {
        if coupon.blocks_submission() {
            debug!("Payment blocked by invalid coupon code");
            return vec![
                Effect::Dom(DomEffect::Select {
                    target: Target::CouponCode,
                }),
                Effect::Dom(DomEffect::PreventSubmit),
            ];
        }

        self.form.spinner_visible = true;
        self.form.error = None;
        let mut effects = vec![
            Effect::Dom(show(Target::Spinner)),
            Effect::Dom(hide(Target::PaymentErrors)),
        ];

        if card.name.is_empty() {
            self.form.spinner_visible = false;
            self.form.error = Some(MISSING_NAME.into());
            effects.extend([
                Effect::Dom(set_text(Target::PaymentErrors, MISSING_NAME)),
                Effect::Dom(show(Target::PaymentErrors)),
                Effect::Dom(hide(Target::Spinner)),
                Effect::Dom(DomEffect::PreventSubmit),
            ]);
            return effects;
        }

        self.form.submit_disabled = true;
        debug!(card = ?card, "Requesting card token");
        effects.extend([
            Effect::Dom(DomEffect::SetDisabled {
                target: Target::PaymentSubmit,
                disabled: true,
            }),
            Effect::Command(Command::RequestToken { card }),
            Effect::Dom(DomEffect::PreventSubmit),
        ]);
        effects
    }

    /// Submission of any other form: the coupon guard still applies.
    pub fn submit_other(&mut self, coupon: &CouponStatus) -> Vec<DomEffect> {
        if coupon.blocks_submission() {
            return vec![
                DomEffect::Select {
                    target: Target::CouponCode,
                },
                DomEffect::PreventSubmit,
            ];
        }

        self.form.spinner_visible = true;
        vec![show(Target::Spinner)]
    }

    pub fn token_created(&mut self, response: TokenResponse) -> Vec<DomEffect> {
        let mut effects = vec![hide(Target::PaymentErrors)];

        match response {
            TokenResponse {
                status,
                id: Some(token),
                error: None,
            } => {
                info!(status, "Card token received, submitting payment form");
                self.form.token = Some(token.clone());
                self.form.spinner_visible = true;
                effects.extend([
                    DomEffect::AppendHiddenInput {
                        form: Target::PaymentForm,
                        id: TOKEN_FIELD.into(),
                        name: TOKEN_FIELD.into(),
                        value: token,
                    },
                    show(Target::Spinner),
                    DomEffect::SubmitForm {
                        form: Target::PaymentForm,
                    },
                ]);
            }
            TokenResponse { status, error, .. } => {
                let message = error
                    .map(|e| e.message)
                    .unwrap_or_else(|| TOKENIZER_UNAVAILABLE.to_string());
                info!(status, message = %message, "Card tokenization failed");

                self.form.spinner_visible = false;
                self.form.submit_disabled = false;
                self.form.error = Some(message.clone());
                effects.extend([
                    hide(Target::Spinner),
                    DomEffect::SetDisabled {
                        target: Target::PaymentSubmit,
                        disabled: false,
                    },
                    set_text(Target::PaymentErrors, message),
                    show(Target::PaymentErrors),
                ]);
            }
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::StatusStyle;

    fn card(name: &str) -> CardDetails {
        CardDetails {
            name: name.into(),
            number: "4242424242424242".into(),
            exp_month: "12".into(),
            exp_year: "2030".into(),
            cvc: "123".into(),
        }
    }

    fn invalid_coupon() -> CouponStatus {
        CouponStatus {
            visible: true,
            text: "Coupon code not found".into(),
            style: Some(StatusStyle::Warning),
        }
    }

    #[test]
    fn invalid_coupon_blocks_submission() {
        let mut payment = PaymentController::new();
        let effects = payment.submit(&invalid_coupon(), card("Jo"));

        assert_eq!(
            effects,
            vec![
                Effect::Dom(DomEffect::Select {
                    target: Target::CouponCode
                }),
                Effect::Dom(DomEffect::PreventSubmit),
            ]
        );
        assert_eq!(payment.form(), &PaymentForm::default());
    }

    #[test]
    fn empty_name_aborts_with_message() {
        let mut payment = PaymentController::new();
        let effects = payment.submit(&CouponStatus::default(), card(""));

        assert!(effects.contains(&Effect::Dom(set_text(Target::PaymentErrors, MISSING_NAME))));
        assert_eq!(effects.last(), Some(&Effect::Dom(DomEffect::PreventSubmit)));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Command(_))));
        assert!(!effects.iter().any(|e| matches!(
            e,
            Effect::Dom(DomEffect::SetDisabled { disabled: true, .. })
        )));

        let form = payment.form();
        assert!(!form.spinner_visible);
        assert!(!form.submit_disabled);
        assert_eq!(form.error.as_deref(), Some(MISSING_NAME));
    }

    #[test]
    fn valid_submit_requests_token() {
        let mut payment = PaymentController::new();
        let success = CouponStatus {
            visible: true,
            text: "20% off forever".into(),
            style: Some(StatusStyle::Success),
        };
        let effects = payment.submit(&success, card("Jo"));

        assert_eq!(
            effects,
            vec![
                Effect::Dom(show(Target::Spinner)),
                Effect::Dom(hide(Target::PaymentErrors)),
                Effect::Dom(DomEffect::SetDisabled {
                    target: Target::PaymentSubmit,
                    disabled: true,
                }),
                Effect::Command(Command::RequestToken { card: card("Jo") }),
                Effect::Dom(DomEffect::PreventSubmit),
            ]
        );
        assert!(payment.form().submit_disabled);
        assert!(payment.form().spinner_visible);
    }

    #[test]
    fn token_success_resubmits_with_hidden_field() {
        let mut payment = PaymentController::new();
        payment.submit(&CouponStatus::default(), card("Jo"));
        let effects = payment.token_created(TokenResponse::token(200, "tok_123"));

        assert_eq!(
            effects,
            vec![
                hide(Target::PaymentErrors),
                DomEffect::AppendHiddenInput {
                    form: Target::PaymentForm,
                    id: "stripe_token".into(),
                    name: "stripe_token".into(),
                    value: "tok_123".into(),
                },
                show(Target::Spinner),
                DomEffect::SubmitForm {
                    form: Target::PaymentForm
                },
            ]
        );
        assert_eq!(payment.form().token.as_deref(), Some("tok_123"));
    }

    #[test]
    fn token_error_reenables_submit() {
        let mut payment = PaymentController::new();
        payment.submit(&CouponStatus::default(), card("Jo"));
        let effects =
            payment.token_created(TokenResponse::failure(402, "Your card was declined."));

        assert!(effects.contains(&hide(Target::Spinner)));
        assert!(effects.contains(&DomEffect::SetDisabled {
            target: Target::PaymentSubmit,
            disabled: false,
        }));
        assert!(effects.contains(&set_text(Target::PaymentErrors, "Your card was declined.")));
        assert_eq!(effects.last(), Some(&show(Target::PaymentErrors)));
        assert!(!payment.form().submit_disabled);
        assert!(!payment.form().spinner_visible);
    }

    #[test]
    fn empty_token_response_is_an_error() {
        let mut payment = PaymentController::new();
        let effects = payment.token_created(TokenResponse {
            status: 200,
            id: None,
            error: None,
        });
        assert!(effects.contains(&set_text(Target::PaymentErrors, TOKENIZER_UNAVAILABLE)));
    }

    #[test]
    fn other_forms_show_spinner_unless_coupon_invalid() {
        let mut payment = PaymentController::new();
        assert_eq!(
            payment.submit_other(&CouponStatus::default()),
            vec![show(Target::Spinner)]
        );
        assert_eq!(
            payment.submit_other(&invalid_coupon()).last(),
            Some(&DomEffect::PreventSubmit)
        );
    }

    #[test]
    fn load_sets_publishable_key_only_when_present() {
        let payment = PaymentController::new();
        assert_eq!(
            payment.load(Some("pk_test_abc")),
            vec![Effect::Command(Command::SetPublishableKey {
                key: "pk_test_abc".into()
            })]
        );
        assert!(payment.load(Some("  ")).is_empty());
        assert!(payment.load(None).is_empty());
    }

    #[test]
    fn debug_redacts_card_number() {
        let rendered = format!("{:?}", card("Jo"));
        assert!(rendered.contains("****4242"));
        assert!(!rendered.contains("4242424242424242"));
        assert!(!rendered.contains("123\""));
    }

    #[test]
    fn debug_redacts_cardholder_and_expiry() {
        let rendered = format!("{:?}", card("Jo Smith"));
        assert!(!rendered.contains("Jo Smith"));
        assert!(!rendered.contains("\"12\""));
        assert!(!rendered.contains("2030"));
    }
}
