use crate::coupon::{CouponDetails, LOOKUP_UNAVAILABLE, LookupOutcome};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const COUPON_CODE_PATH: &str = "/subscription/coupon_code";

pub trait CouponLookup: Send + Sync {
    fn lookup(&self, code: &str, csrf_token: &str) -> Result<LookupOutcome>;
}

#[derive(Debug, Default, Deserialize)]
struct LookupBody {
    data: Option<CouponDetails>,
    error: Option<String>,
}

/// Turn an HTTP status and (possibly unparseable) JSON body into an outcome.
fn classify(status: u16, body: Option<LookupBody>) -> LookupOutcome {
    let body = body.unwrap_or_default();

    if (200..300).contains(&status) {
        if let Some(details) = body.data {
            return LookupOutcome::Found(details);
        }
    }

    LookupOutcome::Failed {
        status,
        message: body.error.unwrap_or_else(|| LOOKUP_UNAVAILABLE.to_string()),
    }
}

pub struct HttpCouponLookup {
    url: String,
    agent: ureq::Agent,
}

impl HttpCouponLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Self {
            url: format!("{}{COUPON_CODE_PATH}", base_url.trim_end_matches('/')),
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl CouponLookup for HttpCouponLookup {
    fn lookup(&self, code: &str, csrf_token: &str) -> Result<LookupOutcome> {
        let response = self
            .agent
            .post(&self.url)
            .header("X-CSRFToken", csrf_token)
            .header("Accept", "application/json")
            .send_form([("coupon_code", code)])
            .context("Coupon code request failed")?;

        let status = response.status().as_u16();
        let body: Option<LookupBody> = response.into_body().read_json().ok();

        debug!(status, parsed = body.is_some(), "Coupon code response received");

        Ok(classify(status, body))
    }
}
