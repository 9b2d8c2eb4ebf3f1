use crate::payment::CardDetails;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const TOKENIZER_UNAVAILABLE: &str = "Your card could not be processed right now.";
const TOKENS_PATH: &str = "/v1/tokens";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenError {
    pub message: String,
}

/// What the hosted tokenization service hands back: a token id or an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    #[serde(skip)]
    pub status: u16,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<TokenError>,
}

impl TokenResponse {
    pub fn token(status: u16, id: impl Into<String>) -> Self {
        Self {
            status,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            id: None,
            error: Some(TokenError {
                message: message.into(),
            }),
        }
    }
}

pub trait Tokenizer: Send + Sync {
    fn set_publishable_key(&self, key: &str);

    fn create_token(&self, card: &CardDetails) -> Result<TokenResponse>;
}

/// Card tokenization against a Stripe-compatible `/v1/tokens` endpoint.
pub struct StripeTokenizer {
    client: Client,
    url: String,
    publishable_key: Mutex<Option<String>>,
}

impl StripeTokenizer {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build tokenizer HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{TOKENS_PATH}", api_base.trim_end_matches('/')),
            publishable_key: Mutex::new(None),
        })
    }

    fn key(&self) -> Option<String> {
        self.publishable_key
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Tokenizer for StripeTokenizer {
    fn set_publishable_key(&self, key: &str) {
        let mut guard = self
            .publishable_key
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(key.to_string());
        debug!("Tokenizer publishable key set");
    }

    fn create_token(&self, card: &CardDetails) -> Result<TokenResponse> {
        let Some(key) = self.key() else {
            warn!("Token requested before a publishable key was set");
            return Ok(TokenResponse::failure(0, TOKENIZER_UNAVAILABLE));
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .form(&card.form_fields())
            .send()
            .context("Tokenization request failed")?;

        let status = response.status().as_u16();
        let mut body: TokenResponse = response
            .json()
            .context("Failed to parse tokenization response")?;
        body.status = status;

        debug!(
            status,
            has_token = body.id.is_some(),
            "Tokenization response received"
        );

        Ok(body)
    }
}
