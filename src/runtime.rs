//! Drives a [`Page`]: feeds it events read as JSON lines, runs the commands
//! it emits on worker threads, and writes DOM effects out as JSON lines.

use crate::coupon::{LOOKUP_UNAVAILABLE, LookupOutcome, LookupResponse};
use crate::coupon_client::CouponLookup;
use crate::dates::{CancellationToken, DateTicker};
use crate::effect::{Command, DomEffect, Effect};
use crate::page::{Page, PageEvent};
use crate::tokenizer::{TOKENIZER_UNAVAILABLE, TokenResponse, Tokenizer};
use anyhow::Result;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(200);

enum Inbound {
    Event(PageEvent),
    Completed(PageEvent),
    InputClosed,
}

pub struct Services {
    pub lookup: Arc<dyn CouponLookup>,
    pub tokenizer: Arc<dyn Tokenizer>,
}

pub struct Runtime<W: Write + Send + 'static> {
    page: Page,
    services: Services,
    out: Arc<Mutex<W>>,
    running: Arc<AtomicBool>,
    refresh_interval: Duration,
    tx: Sender<Inbound>,
    rx: Receiver<Inbound>,
    in_flight: usize,
}

impl<W: Write + Send + 'static> Runtime<W> {
    pub fn new(
        page: Page,
        services: Services,
        out: W,
        running: Arc<AtomicBool>,
        refresh_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            page,
            services,
            out: Arc::new(Mutex::new(out)),
            running,
            refresh_interval,
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Run until the input ends and no work is outstanding, or until the
    /// running flag is cleared.
    pub fn run<R: BufRead + Send + 'static>(mut self, input: R, initial: Vec<Effect>) -> Result<()> {
        self.spawn_reader(input)?;
        self.execute(initial);

        let ticker_token = CancellationToken::new();
        let tickers = self.spawn_tickers(&ticker_token);
        info!(tickers = tickers.len(), "Page runtime started");

        let mut input_closed = false;

        while self.running.load(Ordering::SeqCst) {
            let effects = self.page.tick(Instant::now());
            self.execute(effects);

            if input_closed && self.in_flight == 0 && self.page.next_deadline().is_none() {
                debug!("Input closed and no work outstanding");
                break;
            }

            let timeout = self
                .page
                .next_deadline()
                .map(|due| due.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);

            match self.rx.recv_timeout(timeout) {
                Ok(Inbound::Event(event)) => {
                    let effects = self.page.dispatch(event, Instant::now());
                    self.execute(effects);
                }
                Ok(Inbound::Completed(event)) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    let effects = self.page.dispatch(event, Instant::now());
                    self.execute(effects);
                }
                Ok(Inbound::InputClosed) => input_closed = true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        ticker_token.cancel();
        for ticker in tickers {
            ticker.stop();
        }

        info!("Page runtime stopped");
        Ok(())
    }

    fn spawn_reader<R: BufRead + Send + 'static>(&self, input: R) -> Result<()> {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("event-reader".into())
            .spawn(move || {
                for line in input.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            error!(error = %err, "Failed to read event input");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<PageEvent>(&line) {
                        Ok(event) => {
                            if tx.send(Inbound::Event(event)).is_err() {
                                return;
                            }
                        }
                        Err(err) => warn!(error = %err, line = %line, "Ignoring malformed event"),
                    }
                }
                let _ = tx.send(Inbound::InputClosed);
            })?;
        Ok(())
    }

    fn spawn_tickers(&self, token: &CancellationToken) -> Vec<DateTicker> {
        let renderer = self.page.renderer();
        let mut tickers = Vec::new();

        for (index, datetime) in self.page.relative_dates() {
            let out = Arc::clone(&self.out);
            match DateTicker::spawn(
                index,
                datetime,
                renderer,
                self.refresh_interval,
                token.clone(),
                move |effects| write_effects(&*out, &effects),
            ) {
                Ok(ticker) => tickers.push(ticker),
                Err(err) => error!(error = %err, index, "Failed to spawn date ticker"),
            }
        }

        tickers
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        let mut batch = Vec::new();

        for effect in effects {
            match effect {
                Effect::Dom(effect) => batch.push(effect),
                Effect::Command(command) => {
                    write_effects(&*self.out, &batch);
                    batch.clear();
                    self.run_command(command);
                }
            }
        }

        write_effects(&*self.out, &batch);
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::SetPublishableKey { key } => {
                self.services.tokenizer.set_publishable_key(&key);
            }
            Command::LookupCoupon {
                seq,
                code,
                csrf_token,
            } => {
                let lookup = Arc::clone(&self.services.lookup);
                self.spawn_worker("coupon-lookup", move || {
                    let outcome = lookup.lookup(&code, &csrf_token).unwrap_or_else(|err| {
                        error!(error = %err, seq, "Coupon lookup failed");
                        LookupOutcome::Failed {
                            status: 0,
                            message: LOOKUP_UNAVAILABLE.into(),
                        }
                    });
                    PageEvent::CouponLookupCompleted(LookupResponse { seq, outcome })
                });
            }
            Command::RequestToken { card } => {
                let tokenizer = Arc::clone(&self.services.tokenizer);
                self.spawn_worker("card-token", move || {
                    let response = tokenizer.create_token(&card).unwrap_or_else(|err| {
                        error!(error = %err, "Card tokenization failed");
                        TokenResponse::failure(0, TOKENIZER_UNAVAILABLE)
                    });
                    PageEvent::TokenCreated(response)
                });
            }
        }
    }

    fn spawn_worker<F>(&mut self, name: &str, work: F)
    where
        F: FnOnce() -> PageEvent + Send + 'static,
    {
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = tx.send(Inbound::Completed(work()));
            });

        match spawned {
            Ok(_) => self.in_flight += 1,
            Err(err) => error!(error = %err, worker = name, "Failed to spawn worker"),
        }
    }
}

fn write_effects<W: Write>(out: &Mutex<W>, effects: &[DomEffect]) {
    if effects.is_empty() {
        return;
    }

    let mut out = out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for effect in effects {
        let written = serde_json::to_writer(&mut *out, effect)
            .map_err(std::io::Error::from)
            .and_then(|_| out.write_all(b"\n"));
        if let Err(err) = written {
            error!(error = %err, "Failed to write effect");
            return;
        }
    }
    if let Err(err) = out.flush() {
        error!(error = %err, "Failed to flush effects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::CouponDetails;
    use crate::dates::DateRenderer;
    use crate::markup::PageSnapshot;
    use crate::page::PageSettings;
    use crate::payment::CardDetails;
    use chrono::{FixedOffset, Utc};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[derive(Default)]
    struct FakeLookup {
        calls: AtomicUsize,
        codes: Mutex<Vec<String>>,
    }

    impl CouponLookup for FakeLookup {
        fn lookup(&self, code: &str, _csrf_token: &str) -> Result<LookupOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.codes.lock().unwrap().push(code.to_string());
            if code == "SAVE20" {
                Ok(LookupOutcome::Found(CouponDetails {
                    percent_off: Some(20),
                    amount_off: None,
                    duration: "forever".into(),
                    duration_in_months: None,
                }))
            } else {
                Err(anyhow::anyhow!("connection refused"))
            }
        }
    }

    #[derive(Default)]
    struct FakeTokenizer {
        key: Mutex<Option<String>>,
    }

    impl Tokenizer for FakeTokenizer {
        fn set_publishable_key(&self, key: &str) {
            *self.key.lock().unwrap() = Some(key.to_string());
        }

        fn create_token(&self, _card: &CardDetails) -> Result<TokenResponse> {
            Ok(TokenResponse::token(200, "tok_fake"))
        }
    }

    fn page(snapshot: PageSnapshot) -> (Page, Vec<Effect>) {
        Page::load(
            snapshot,
            PageSettings {
                csrf_token: Some("csrf".into()),
                lookup_delay: Duration::from_millis(20),
                discard_stale_responses: false,
                renderer: DateRenderer::new(FixedOffset::east_opt(0).unwrap()),
            },
            Utc::now(),
        )
    }

    fn run(input: &str, snapshot: PageSnapshot) -> (SharedBuf, Arc<FakeLookup>, Arc<FakeTokenizer>) {
        let out = SharedBuf::default();
        let lookup = Arc::new(FakeLookup::default());
        let tokenizer = Arc::new(FakeTokenizer::default());
        let (page, initial) = page(snapshot);

        let runtime = Runtime::new(
            page,
            Services {
                lookup: lookup.clone(),
                tokenizer: tokenizer.clone(),
            },
            out.clone(),
            Arc::new(AtomicBool::new(true)),
            Duration::from_millis(1000),
        );
        runtime
            .run(Cursor::new(input.to_string()), initial)
            .unwrap();

        (out, lookup, tokenizer)
    }

    #[test]
    fn debounced_lookup_renders_status() {
        let input = concat!(
            r#"{"event": "coupon_key_up", "value": "SAVE"}"#,
            "\n",
            r#"{"event": "coupon_key_up", "value": "SAVE20"}"#,
            "\n",
        );
        let (out, lookup, _) = run(input, PageSnapshot::default());

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*lookup.codes.lock().unwrap(), vec!["SAVE20".to_string()]);

        let lines = out.lines();
        assert!(lines.contains(&serde_json::json!({
            "op": "set_text",
            "target": "#coupon_code_status",
            "text": "20% off forever",
        })));
        assert_eq!(
            lines.last(),
            Some(&serde_json::json!({"op": "show", "target": "#coupon_code_status"}))
        );
    }

    #[test]
    fn transport_failure_renders_error() {
        let input = concat!(r#"{"event": "coupon_key_up", "value": "NOPE"}"#, "\n");
        let (out, _, _) = run(input, PageSnapshot::default());

        let lines = out.lines();
        assert!(lines.contains(&serde_json::json!({
            "op": "add_class",
            "target": "#coupon_code_status",
            "class": "alert-error",
        })));
        assert!(lines.contains(&serde_json::json!({
            "op": "set_text",
            "target": "#coupon_code_status",
            "text": LOOKUP_UNAVAILABLE,
        })));
    }

    #[test]
    fn payment_submission_resubmits_with_token() {
        let input = concat!(
            r#"{"event": "form_submitted", "form": {"kind": "payment", "card": {"name": "Jo", "number": "4242424242424242"}}}"#,
            "\n",
        );
        let snapshot = PageSnapshot {
            stripe_key: Some("pk_test_abc".into()),
            ..PageSnapshot::default()
        };
        let (out, _, tokenizer) = run(input, snapshot);

        assert_eq!(tokenizer.key.lock().unwrap().as_deref(), Some("pk_test_abc"));

        let lines = out.lines();
        assert!(lines.contains(&serde_json::json!({"op": "prevent_submit"})));
        assert!(lines.contains(&serde_json::json!({
            "op": "append_hidden_input",
            "form": "#payment_form",
            "id": "stripe_token",
            "name": "stripe_token",
            "value": "tok_fake",
        })));
        assert_eq!(
            lines.last(),
            Some(&serde_json::json!({"op": "submit_form", "form": "#payment_form"}))
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = concat!(
            "not json\n",
            r#"{"event": "select_all_changed", "checked": true}"#,
            "\n",
        );
        let snapshot = PageSnapshot {
            checkbox_items: 1,
            ..PageSnapshot::default()
        };
        let (out, lookup, _) = run(input, snapshot);

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            out.lines().last(),
            Some(&serde_json::json!({
                "op": "set_text",
                "target": "#scope option:first",
                "text": "1 selected item",
            }))
        );
    }

    #[test]
    fn cleared_running_flag_stops_immediately() {
        let out = SharedBuf::default();
        let (page, initial) = page(PageSnapshot::default());
        let running = Arc::new(AtomicBool::new(false));
        let runtime = Runtime::new(
            page,
            Services {
                lookup: Arc::new(FakeLookup::default()),
                tokenizer: Arc::new(FakeTokenizer::default()),
            },
            out.clone(),
            running,
            Duration::from_millis(1000),
        );

        runtime.run(Cursor::new(String::new()), initial).unwrap();
        assert!(out.lines().is_empty());
    }
}
