//! Coercion primitives: untrusted JSON value → typed canonical value.
//!
//! Every function here is total: anything it cannot make sense of becomes
//! `None`. None of them log; the canonicalizer reports what it resolved.

use crate::aliases::{CURRENCY_SYMBOLS, DATE_FORMATS, KNOWN_CURRENCY_CODES, TWO_DIGIT_YEAR_FORMATS};
use crate::model::round_money;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Keys unwrapped from a nested object holding a single amount.
const AMOUNT_KEYS: &[&str] = &["amount", "value"];

/// Keys unwrapped from a nested object holding a single text value.
const TEXT_KEYS: &[&str] = &["name", "value", "text"];

// ── Amounts ──────────────────────────────────────────────────────────────────

/// `(`, sign, digits with separators, trailing sign, `)`.
static RE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\()?(-)?([0-9][0-9.,]*)(-)?(\))?$").unwrap());

/// Parse a non-negative money amount rounded to cents.
pub fn parse_money(value: &Value) -> Option<Decimal> {
    parse_non_negative(value).map(round_money)
}

/// Parse a non-negative quantity (not rounded).
pub fn parse_quantity(value: &Value) -> Option<Decimal> {
    parse_non_negative(value).map(|q| q.normalize())
}

fn parse_non_negative(value: &Value) -> Option<Decimal> {
    let amount = parse_signed_amount(value)?;
    if amount < Decimal::ZERO {
        None
    } else {
        // `-0` compares equal to zero; drop its sign.
        Some(amount.abs())
    }
}

/// Parse an amount keeping its sign. Strings, numbers and `{"amount": …}` objects.
pub fn parse_signed_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => parse_amount_str(s),
        Value::Object(map) => AMOUNT_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .filter(|inner| !inner.is_object())
            .and_then(parse_signed_amount),
        _ => None,
    }
}

fn is_amount_char(c: char) -> bool {
    c.is_ascii_digit()
        || matches!(c, '.' | ',' | '-' | '(' | ')' | '\'' | ' ' | '\u{00A0}' | '\u{202F}')
}

fn parse_amount_str(raw: &str) -> Option<Decimal> {
    // Trim leading/trailing labels and symbols ("USD", "$", "€", "Total:").
    let start = raw.find(|c: char| c.is_ascii_digit() || c == '-' || c == '(')?;
    let end = raw.rfind(|c: char| c.is_ascii_digit() || c == '-' || c == ')')?;
    if end < start {
        return None;
    }
    let core = &raw[start..=end];
    if !core.chars().all(is_amount_char) {
        return None;
    }
    let compact: String = core
        .chars()
        .filter(|c| !matches!(c, '\'' | ' ' | '\u{00A0}' | '\u{202F}'))
        .collect();

    let caps = RE_AMOUNT.captures(&compact)?;
    let open = caps.get(1).is_some();
    let close = caps.get(5).is_some();
    if open != close {
        return None;
    }
    let negative = open || caps.get(2).is_some() || caps.get(4).is_some();
    let number = normalize_separators(&caps[3])?;
    let value = Decimal::from_str(&number).ok()?;
    Some(if negative { -value } else { value })
}

/// Rewrite a digit string with `.`/`,` separators into plain `1234.56` form.
fn normalize_separators(s: &str) -> Option<String> {
    let out = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            if s.matches(decimal).count() > 1 {
                return None;
            }
            s.replace(thousands, "").replace(decimal, ".")
        }
        (None, Some(comma)) => {
            let digits_after = s.len() - comma - 1;
            if s.matches(',').count() == 1 && (digits_after == 1 || digits_after == 2) {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };
    let out = out.trim_end_matches('.').to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

// ── Dates ────────────────────────────────────────────────────────────────────

static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

/// Parse a calendar date from the accepted formats; first match wins.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n.as_u64().and_then(|v| parse_compact_date(&v.to_string())),
        Value::Object(map) => ["value", "date"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(|inner| inner.as_str())
            .and_then(parse_date_str),
        _ => None,
    }
}

fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let s = RE_ORDINAL.replace_all(&collapsed, "$1");
    let s = s.as_ref();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            // "%Y" happily reads "24" as year 24; leave that to the "%y" formats.
            if d.year() >= 1000 {
                return Some(d);
            }
        }
    }
    if let Some(d) = parse_compact_date(s) {
        return Some(d);
    }
    TWO_DIGIT_YEAR_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// `YYYYMMDD`.
fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).filter(|d| d.year() >= 1000)
}

// ── Text ─────────────────────────────────────────────────────────────────────

/// Trimmed text with internal whitespace (including newlines) collapsed.
pub fn parse_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let joined = s.split_whitespace().collect::<Vec<_>>().join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => TEXT_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .filter(|inner| !inner.is_object())
            .and_then(parse_text),
        _ => None,
    }
}

// ── Currency ─────────────────────────────────────────────────────────────────

static RE_CURRENCY_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3}\b").unwrap());

/// Parse an explicit currency field: any three-letter code, or a known symbol.
pub fn parse_currency(value: &Value) -> Option<String> {
    let text = parse_text(value)?;
    if text.len() == 3 && text.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(text.to_ascii_uppercase());
    }
    detect_currency(&text)
}

/// Recover a currency from free text such as `"US$ 1,200"` or `"1.200,00 EUR"`.
pub fn detect_currency(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    if let Some(code) = RE_CURRENCY_CODE
        .find_iter(&upper)
        .map(|m| m.as_str())
        .find(|code| KNOWN_CURRENCY_CODES.contains(code))
    {
        return Some(code.to_string());
    }
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| upper.contains(&symbol.to_uppercase()))
        .map(|(_, code)| code.to_string())
}

// ── Tests ────────────────────────────────────────────────────────────────────
