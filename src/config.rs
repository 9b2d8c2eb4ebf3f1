use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub page: PageConfig,

    #[serde(default)]
    pub coupon: CouponConfig,

    #[serde(default)]
    pub dates: DatesConfig,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageConfig {
    /// Server-rendered HTML to scan for dates, rows and tokens.
    pub markup_path: Option<String>,
    /// Used when the markup has no `csrf-token` meta tag.
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CouponConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_lookup_delay")]
    pub lookup_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub discard_stale_responses: bool,
}

#[derive(Debug, Deserialize)]
pub struct DatesConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_tokenizer_api_base")]
    pub api_base: String,

    #[serde(default = "default_tokenizer_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_lookup_delay() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_refresh_interval() -> u64 {
    1000
}

fn default_tokenizer_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_tokenizer_timeout() -> u64 {
    30
}

impl Default for CouponConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            lookup_delay_ms: default_lookup_delay(),
            request_timeout_seconds: default_request_timeout(),
            discard_stale_responses: false,
        }
    }
}

impl Default for DatesConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            utc_offset_minutes: 0,
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            api_base: default_tokenizer_api_base(),
            timeout_seconds: default_tokenizer_timeout(),
        }
    }
}

/// Load configuration from config.toml and environment variables
pub fn load() -> Result<Config> {
    from_figment(
        Figment::new()
            .merge(Toml::file("config.toml"))
            // Use double-underscore nesting for snake_case keys
            .merge(Env::prefixed("SNAKE_EYES_UI_").split("__")),
    )
}

fn from_figment(figment: Figment) -> Result<Config> {
    figment.extract().context("Failed to load configuration")
}

/// Validate configuration and return a user-friendly error
pub fn validate(config: &Config) -> Result<(), String> {
    if config.coupon.base_url.trim().is_empty() {
        return Err("coupon.base_url is required".into());
    }

    if config.coupon.request_timeout_seconds == 0 {
        return Err("coupon.request_timeout_seconds must be greater than 0".into());
    }

    if config.dates.refresh_interval_ms == 0 {
        return Err("dates.refresh_interval_ms must be greater than 0".into());
    }

    // chrono accepts strictly less than a day in either direction
    if config.dates.utc_offset_minutes.abs() >= 24 * 60 {
        return Err("dates.utc_offset_minutes must be within +/- 1439".into());
    }

    if config.tokenizer.api_base.trim().is_empty() {
        return Err("tokenizer.api_base is required".into());
    }

    if config.tokenizer.timeout_seconds == 0 {
        return Err("tokenizer.timeout_seconds must be greater than 0".into());
    }

    Ok(())
}

/// A sanitized view of Config safe for logging
#[derive(Debug)]
#[allow(dead_code)]
pub struct SanitizedConfig {
    pub markup_path: String,
    pub csrf_token: String,
    pub base_url: String,
    pub lookup_delay_ms: u64,
    pub discard_stale_responses: bool,
    pub refresh_interval_ms: u64,
    pub utc_offset_minutes: i32,
    pub tokenizer_api_base: String,
}

impl Config {
    pub fn sanitized_for_log(&self) -> SanitizedConfig {
        SanitizedConfig {
            markup_path: self
                .page
                .markup_path
                .clone()
                .unwrap_or_else(|| "<not set>".into()),
            csrf_token: if self.page.csrf_token.is_some() {
                "******".into()
            } else {
                "<not set>".into()
            },
            base_url: self.coupon.base_url.clone(),
            lookup_delay_ms: self.coupon.lookup_delay_ms,
            discard_stale_responses: self.coupon.discard_stale_responses,
            refresh_interval_ms: self.dates.refresh_interval_ms,
            utc_offset_minutes: self.dates.utc_offset_minutes,
            tokenizer_api_base: self.tokenizer.api_base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn defaults_without_sources() {
        let config = from_figment(Figment::new()).unwrap();
        assert_eq!(config.coupon.base_url, "http://localhost:8000");
        assert_eq!(config.coupon.lookup_delay_ms, 300);
        assert!(!config.coupon.discard_stale_responses);
        assert_eq!(config.dates.refresh_interval_ms, 1000);
        assert_eq!(config.tokenizer.api_base, "https://api.stripe.com");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [coupon]
            base_url = "https://example.test"
            discard_stale_responses = true

            [dates]
            utc_offset_minutes = -300
            "#,
        ));
        let config = from_figment(figment).unwrap();
        assert_eq!(config.coupon.base_url, "https://example.test");
        assert!(config.coupon.discard_stale_responses);
        assert_eq!(config.coupon.lookup_delay_ms, 300);
        assert_eq!(config.dates.utc_offset_minutes, -300);
    }

    #[test]
    fn rejects_zero_refresh_interval() {
        let figment = Figment::new().merge(Serialized::default("dates.refresh_interval_ms", 0));
        let config = from_figment(figment).unwrap();
        assert_eq!(
            validate(&config),
            Err("dates.refresh_interval_ms must be greater than 0".into())
        );
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let mut config = Config::default();
        config.dates.utc_offset_minutes = 24 * 60;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_empty_base_url() {
        let mut config = Config::default();
        config.coupon.base_url = "  ".into();
        assert_eq!(validate(&config), Err("coupon.base_url is required".into()));
    }

    #[test]
    fn sanitized_view_masks_csrf_token() {
        let mut config = Config::default();
        config.page.csrf_token = Some("secret".into());
        let sanitized = config.sanitized_for_log();
        assert_eq!(sanitized.csrf_token, "******");
        assert_eq!(sanitized.markup_path, "<not set>");
    }
}
