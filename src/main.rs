mod bulk;
mod config;
mod coupon;
mod coupon_client;
mod dates;
mod debounce;
mod effect;
mod markup;
mod page;
mod payment;
mod runtime;
mod tokenizer;
mod util;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use config::{Config, load as config_load, validate as config_validate};
use coupon_client::HttpCouponLookup;
use dates::DateRenderer;
use markup::PageSnapshot;
use page::{Page, PageSettings};
use runtime::{Runtime, Services};
use std::io::BufReader;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokenizer::StripeTokenizer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = config_validate(&config) {
        eprintln!("Configuration error: {err}");
        std::process::exit(1);
    }

    info!(
        config = ?config.sanitized_for_log(),
        "Effective configuration loaded"
    );

    if let Err(err) = run(config) {
        let message = format!("{err:#}");
        error!(error = %message, "Page runtime failed");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let snapshot = match &config.page.markup_path {
        Some(path) => {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read page markup at {path}"))?;
            PageSnapshot::from_html(&html)
        }
        None => PageSnapshot::default(),
    };

    let offset = FixedOffset::east_opt(config.dates.utc_offset_minutes * 60)
        .context("dates.utc_offset_minutes is out of range")?;

    let (page, initial) = Page::load(
        snapshot,
        PageSettings {
            csrf_token: config.page.csrf_token.clone(),
            lookup_delay: Duration::from_millis(config.coupon.lookup_delay_ms),
            discard_stale_responses: config.coupon.discard_stale_responses,
            renderer: DateRenderer::new(offset),
        },
        Utc::now(),
    );

    let services = Services {
        lookup: Arc::new(HttpCouponLookup::new(
            &config.coupon.base_url,
            Duration::from_secs(config.coupon.request_timeout_seconds),
        )),
        tokenizer: Arc::new(StripeTokenizer::new(
            &config.tokenizer.api_base,
            Duration::from_secs(config.tokenizer.timeout_seconds),
        )?),
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);

    ctrlc::set_handler(move || {
        info!("Ctrl-C received, shutting down gracefully");
        running_signal.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    Runtime::new(
        page,
        services,
        std::io::stdout(),
        running,
        Duration::from_millis(config.dates.refresh_interval_ms),
    )
    .run(BufReader::new(std::io::stdin()), initial)
}
