//! The page's contract with the server-rendered markup: which elements the
//! controllers address, the CSS classes they toggle, and a bootstrap scan
//! of the initial HTML.

use crate::dates::{DateElement, DateKind};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

pub const SELECTED_ROW_CLASS: &str = "warning";
pub const STATUS_SUCCESS_CLASS: &str = "alert-success";
pub const STATUS_WARNING_CLASS: &str = "alert-warning";
pub const STATUS_ERROR_CLASS: &str = "alert-error";

/// An element (or indexed member of an element group) on the page.
///
/// Selectors use jQuery positional pseudo-classes (`:eq`, `:first`, `:has`),
/// so the bridge must resolve them through jQuery rather than
/// `querySelectorAll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    FromNow(usize),
    ShortDate(usize),
    CheckboxItem(usize),
    /// The table row that holds checkbox item `n`. Each row holds one item,
    /// so the row is picked by position among rows that have an item.
    Row(usize),
    ColHeader,
    ScopeFirstOption,
    BulkActions,
    DurationInMonths,
    RedeemBy,
    PaymentForm,
    PaymentSubmit,
    CouponCode,
    CouponCodeStatus,
    PaymentErrors,
    Spinner,
}

impl Target {
    pub fn selector(&self) -> String {
        match self {
            Target::FromNow(i) => format!(".from-now:eq({i})"),
            Target::ShortDate(i) => format!(".short-date:eq({i})"),
            Target::CheckboxItem(i) => format!(".checkbox-item:eq({i})"),
            Target::Row(i) => format!("tr:has(.checkbox-item):eq({i})"),
            Target::ColHeader => ".col-header".into(),
            Target::ScopeFirstOption => "#scope option:first".into(),
            Target::BulkActions => "#bulk_actions".into(),
            Target::DurationInMonths => "#duration-in-months".into(),
            Target::RedeemBy => "#redeem_by".into(),
            Target::PaymentForm => "#payment_form".into(),
            Target::PaymentSubmit => "#payment_form button".into(),
            Target::CouponCode => "#coupon_code".into(),
            Target::CouponCodeStatus => "#coupon_code_status".into(),
            Target::PaymentErrors => ".payment-errors".into(),
            Target::Spinner => ".spinner".into(),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.selector())
    }
}

/// What the controllers need to know about the page when it first loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub csrf_token: Option<String>,
    pub stripe_key: Option<String>,
    pub dates: Vec<DateElement>,
    pub checkbox_items: usize,
    pub has_redeem_by: bool,
    pub duration: Option<String>,
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)(\s[^>]*)?>").expect("invalid tag regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
    .expect("invalid attribute regex")
});

static DURATION_SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<select[^>]*\bid\s*=\s*["']duration["'][^>]*>(.*?)</select>"#)
        .expect("invalid select regex")
});

struct Tag {
    name: String,
    attrs: HashMap<String, String>,
}

impl Tag {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

fn tags(html: &str) -> impl Iterator<Item = Tag> + '_ {
    TAG_RE.captures_iter(html).map(|caps| {
        let name = caps[1].to_ascii_lowercase();
        let attrs = caps
            .get(2)
            .map(|m| parse_attrs(m.as_str()))
            .unwrap_or_default();
        Tag { name, attrs }
    })
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), unescape(value))
        })
        .collect()
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl PageSnapshot {
    /// Scan server-rendered HTML for the elements the controllers use.
    pub fn from_html(html: &str) -> Self {
        let mut snapshot = PageSnapshot::default();

        for tag in tags(html) {
            if tag.name == "meta" && tag.attr("name") == Some("csrf-token") {
                snapshot.csrf_token = tag.attr("content").map(str::to_string);
            }

            match tag.attr("id") {
                Some("stripe_key") => {
                    snapshot.stripe_key = tag.attr("value").map(str::to_string);
                }
                Some("redeem_by") => snapshot.has_redeem_by = true,
                _ => {}
            }

            let kind = if tag.has_class("from-now") {
                Some(DateKind::Relative)
            } else if tag.has_class("short-date") {
                Some(DateKind::Short)
            } else {
                None
            };
            if let Some(kind) = kind {
                snapshot.dates.push(DateElement {
                    kind,
                    datetime: tag.attr("data-datetime").unwrap_or_default().to_string(),
                });
            }

            if tag.has_class("checkbox-item") {
                snapshot.checkbox_items += 1;
            }
        }

        snapshot.duration = selected_duration(html);

        debug!(
            dates = snapshot.dates.len(),
            checkbox_items = snapshot.checkbox_items,
            has_csrf_token = snapshot.csrf_token.is_some(),
            has_redeem_by = snapshot.has_redeem_by,
            "Scanned page markup"
        );

        snapshot
    }
}

/// The value of the selected `#duration` option, or its first option.
fn selected_duration(html: &str) -> Option<String> {
    let body = DURATION_SELECT_RE.captures(html)?.get(1)?.as_str();
    let options: Vec<Tag> = tags(body).filter(|tag| tag.name == "option").collect();

    options
        .iter()
        .find(|tag| tag.attr("selected").is_some())
        .or_else(|| options.first())
        .and_then(|tag| tag.attr("value").map(str::to_string))
}
