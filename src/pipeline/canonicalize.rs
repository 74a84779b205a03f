//! Raw extraction → [`CanonicalInvoice`].
//!
//! Source keys are normalised once, then every canonical field walks its
//! ordered alias list and takes the first alias whose value coerces. A key
//! that is present but unusable (`"total": "N/A"`) does not block a later
//! alias (`"amount_due": "5.00"`).
//!
//! Canonicalization never fails. Whatever cannot be read is left absent and
//! costs confidence later in the scorer.

use crate::aliases::{field_aliases, line_item_aliases, normalize_key};
use crate::config::PipelineConfig;
use crate::model::{CanonicalInvoice, LineItem, RawExtraction};
use crate::pipeline::coerce::{
    detect_currency, parse_currency, parse_date, parse_money, parse_quantity, parse_text,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

/// `item_1_desc`, `line2_qty`, `line_item_3_unit_price` (keys already normalised).
static RE_FLAT_ITEM_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:line_item|item|line)_?(\d+)_(.+)$").unwrap());

/// Normalised key → value. On collisions the first key in map order wins.
type KeyIndex<'a> = BTreeMap<String, &'a Value>;

fn index_keys(map: &serde_json::Map<String, Value>) -> KeyIndex<'_> {
    let mut index = BTreeMap::new();
    for (key, value) in map {
        index.entry(normalize_key(key)).or_insert(value);
    }
    index
}

/// First alias (in order) whose value passes `coerce`, with the alias used.
fn resolve<T>(
    index: &KeyIndex<'_>,
    aliases: &'static [&'static str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<(T, &'static str)> {
    aliases.iter().find_map(|alias| {
        index
            .get(*alias)
            .and_then(|value| coerce(*value))
            .map(|v| (v, *alias))
    })
}

/// Turns raw payloads into canonical records.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    default_currency: String,
}

impl Canonicalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            default_currency: config.default_currency.clone(),
        }
    }

    pub fn canonicalize(&self, raw: &RawExtraction) -> CanonicalInvoice {
        let index = index_keys(raw);
        let mut record = CanonicalInvoice::empty(self.default_currency.clone());

        if let Some(vendor) = self.field(&index, "vendor_name", parse_text) {
            record.vendor_name = vendor;
        }
        record.invoice_number = self.field(&index, "invoice_number", parse_text);
        record.invoice_date = self.field(&index, "invoice_date", parse_date);
        record.due_date = self.field(&index, "due_date", parse_date);
        record.subtotal = self.field(&index, "subtotal", parse_money);
        record.tax_amount = self.field(&index, "tax_amount", parse_money);
        record.total_amount = self.field(&index, "total_amount", parse_money);
        record.payment_terms = self.field(&index, "payment_terms", parse_text);
        record.line_items = resolve_line_items(&index);

        if let Some(code) = self.resolve_currency(&index) {
            record.currency = code;
            record.currency_defaulted = false;
        }

        let (filled, of) = record.coverage();
        debug!(
            filled,
            of,
            line_items = record.line_items.len(),
            currency = %record.currency,
            "canonicalized extraction"
        );
        record
    }

    fn field<T>(
        &self,
        index: &KeyIndex<'_>,
        canonical: &'static str,
        coerce: impl Fn(&Value) -> Option<T>,
    ) -> Option<T> {
        match resolve(index, field_aliases(canonical), coerce) {
            Some((value, alias)) => {
                debug!(field = canonical, alias, "resolved field");
                Some(value)
            }
            None => {
                debug!(field = canonical, "field absent");
                None
            }
        }
    }

    /// Explicit field first, then symbols/codes embedded in raw amount strings.
    fn resolve_currency(&self, index: &KeyIndex<'_>) -> Option<String> {
        if let Some((code, alias)) = resolve(index, field_aliases("currency"), parse_currency) {
            debug!(alias, %code, "currency from explicit field");
            return Some(code);
        }
        for canonical in ["total_amount", "subtotal", "tax_amount"] {
            let detected = field_aliases(canonical)
                .iter()
                .filter_map(|alias| index.get(*alias))
                .filter_map(|value| value.as_str())
                .find_map(detect_currency);
            if let Some(code) = detected {
                debug!(source = canonical, %code, "currency detected in amount text");
                return Some(code);
            }
        }
        None
    }
}

/// Free-function form of [`Canonicalizer::canonicalize`].
pub fn canonicalize(raw: &RawExtraction, config: &PipelineConfig) -> CanonicalInvoice {
    Canonicalizer::new(config).canonicalize(raw)
}

// ── Line items ───────────────────────────────────────────────────────────────

fn resolve_line_items(index: &KeyIndex<'_>) -> Vec<LineItem> {
    let sequence = field_aliases("line_items").iter().find_map(|alias| {
        index
            .get(*alias)
            .and_then(|value| as_sequence(*value))
            .filter(|entries| !entries.is_empty())
            .map(|entries| (entries, *alias))
    });
    if let Some((entries, alias)) = sequence {
        debug!(alias, count = entries.len(), "line items from sequence");
        return entries.iter().map(line_item_from_entry).collect();
    }

    let flat = flat_line_items(index);
    if !flat.is_empty() {
        debug!(count = flat.len(), "line items from flat indexed keys");
    }
    flat
}

/// An array, or a string holding a JSON array.
fn as_sequence(value: &Value) -> Option<Cow<'_, [Value]>> {
    match value {
        Value::Array(entries) => Some(Cow::Borrowed(entries.as_slice())),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s.trim())
            .ok()
            .map(Cow::Owned),
        _ => None,
    }
}

fn line_item_from_entry(entry: &Value) -> LineItem {
    match entry {
        Value::Object(map) => line_item_from_index(&index_keys(map)),
        Value::String(_) => LineItem {
            description: parse_text(entry).unwrap_or_default(),
            ..LineItem::default()
        },
        _ => LineItem::default(),
    }
}

fn line_item_from_index(index: &KeyIndex<'_>) -> LineItem {
    let sub = |name: &'static str| line_item_aliases(name);
    let quantity = resolve(index, sub("quantity"), parse_quantity).map(|(q, _)| q);
    LineItem {
        description: resolve(index, sub("description"), parse_text)
            .map(|(d, _)| d)
            .unwrap_or_default(),
        quantity: quantity.unwrap_or(rust_decimal::Decimal::ONE),
        quantity_defaulted: quantity.is_none(),
        unit_price: resolve(index, sub("unit_price"), parse_money).map(|(p, _)| p),
        line_total: resolve(index, sub("line_total"), parse_money).map(|(t, _)| t),
    }
}

/// Group `item_<n>_<field>` keys by `n` (ascending) and build one item per group.
fn flat_line_items(index: &KeyIndex<'_>) -> Vec<LineItem> {
    let mut groups: BTreeMap<u64, KeyIndex<'_>> = BTreeMap::new();
    for (key, value) in index {
        let Some(caps) = RE_FLAT_ITEM_KEY.captures(key) else {
            continue;
        };
        let Ok(n) = caps[1].parse::<u64>() else {
            continue;
        };
        groups
            .entry(n)
            .or_default()
            .entry(caps[2].to_string())
            .or_insert(*value);
    }
    groups.values().map(line_item_from_index).collect()
}
