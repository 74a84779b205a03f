//! Accepted input vocabulary: field-name aliases, date formats, currency symbols.
//!
//! The recognition service does not keep its field names stable between
//! runs ("total", "total_amount" and "grand_total" all appear). Every accepted
//! spelling lives here as static data, so the accepted input surface can be
//! audited and tested in one place.
//!
//! Alias lists are ordered: the canonicalizer takes the first alias that has
//! a usable value. Every alias is stored in normalised form (see
//! [`normalize_key`]).

/// Canonical name → ordered source-key aliases for top-level fields.
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    (
        "vendor_name",
        &[
            "vendor_name",
            "vendor",
            "supplier_name",
            "supplier",
            "seller_name",
            "seller",
            "company_name",
            "merchant_name",
            "merchant",
            "from",
        ],
    ),
    (
        "invoice_number",
        &[
            "invoice_number",
            "invoice_no",
            "invoice_id",
            "invoice_num",
            "inv_no",
            "number",
        ],
    ),
    (
        "invoice_date",
        &[
            "invoice_date",
            "date",
            "issue_date",
            "date_issued",
            "bill_date",
            "invoice_dt",
        ],
    ),
    (
        "due_date",
        &["due_date", "payment_due_date", "date_due", "due", "pay_by"],
    ),
    (
        "subtotal",
        &[
            "subtotal",
            "sub_total",
            "net_amount",
            "net_total",
            "amount_before_tax",
            "total_before_tax",
        ],
    ),
    (
        "tax_amount",
        &[
            "tax_amount",
            "tax",
            "total_tax",
            "tax_total",
            "vat",
            "vat_amount",
            "gst",
            "sales_tax",
        ],
    ),
    (
        "total_amount",
        &[
            "total_amount",
            "total",
            "grand_total",
            "invoice_total",
            "amount_due",
            "total_due",
            "balance_due",
            "amount",
        ],
    ),
    ("currency", &["currency", "currency_code", "curr", "ccy"]),
    (
        "payment_terms",
        &["payment_terms", "terms", "payment_term", "payment_conditions"],
    ),
    (
        "line_items",
        &["line_items", "items", "lineitems", "line_item", "products", "lines"],
    ),
];

/// Canonical line-item sub-field → ordered aliases (object keys and flat-key suffixes).
pub const LINE_ITEM_ALIASES: &[(&str, &[&str])] = &[
    (
        "description",
        &[
            "description",
            "desc",
            "item_description",
            "item",
            "name",
            "product",
            "product_name",
            "service",
        ],
    ),
    (
        "quantity",
        &["quantity", "qty", "units", "count", "quantity_ordered"],
    ),
    (
        "unit_price",
        &[
            "unit_price",
            "price",
            "rate",
            "unit_cost",
            "price_per_unit",
            "unit_amount",
        ],
    ),
    (
        "line_total",
        &[
            "line_total",
            "total",
            "amount",
            "line_amount",
            "total_price",
            "extended_price",
            "ext_price",
        ],
    ),
];

/// Prefixes of flat indexed line-item keys (`item_1_desc`, `line2_qty`, …).
pub const FLAT_ITEM_PREFIXES: &[&str] = &["line_item", "item", "line"];

/// Date formats with a four-digit year, tried in order.
///
/// US month-first precedes day-first: `03/04/2024` reads as March 4.
/// Compact `YYYYMMDD` is handled separately by the date coercion.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
];

/// Date formats with a two-digit year, tried after [`DATE_FORMATS`].
pub const TWO_DIGIT_YEAR_FORMATS: &[&str] = &[
    "%m/%d/%y", "%d/%m/%y", "%d.%m.%y", "%d-%b-%y", "%y-%m-%d",
];

/// Currency symbols and prefixed symbols → ISO 4217 code. Longest match first.
pub const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("CA$", "CAD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("AU$", "AUD"),
    ("NZ$", "NZD"),
    ("S$", "SGD"),
    ("HK$", "HKD"),
    ("R$", "BRL"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
    ("₽", "RUB"),
    ("₺", "TRY"),
    ("₪", "ILS"),
    ("₱", "PHP"),
    ("฿", "THB"),
    ("zł", "PLN"),
    ("$", "USD"),
];

/// ISO 4217 codes recognised inside free-text amounts (`"USD 1,200.00"`).
///
/// An explicit currency field accepts any three-letter code; free text only
/// accepts these, so words like "VAT" or "NET" are never mistaken for one.
pub const KNOWN_CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "INR", "CAD", "AUD", "NZD", "CHF", "SEK", "NOK", "DKK",
    "PLN", "CZK", "HUF", "RON", "BGN", "MKD", "RSD", "SGD", "HKD", "KRW", "BRL", "MXN", "ZAR",
    "AED", "SAR", "TRY", "RUB", "ILS", "THB", "PHP", "MYR", "IDR",
];

/// Normalise a source key for alias comparison.
///
/// Lower-cases, trims, and maps runs of spaces, hyphens and dots to a single
/// underscore: `"Vendor Name"`, `"vendor-name"` and `"VENDOR_NAME"` all
/// become `"vendor_name"`.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;
    for ch in key.trim().chars() {
        if ch == ' ' || ch == '-' || ch == '.' || ch == '_' {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Aliases of a top-level canonical field, or an empty slice if unknown.
pub fn field_aliases(canonical: &str) -> &'static [&'static str] {
    lookup(FIELD_ALIASES, canonical)
}

/// Aliases of a line-item sub-field, or an empty slice if unknown.
pub fn line_item_aliases(canonical: &str) -> &'static [&'static str] {
    lookup(LINE_ITEM_ALIASES, canonical)
}

fn lookup(
    table: &'static [(&'static str, &'static [&'static str])],
    canonical: &str,
) -> &'static [&'static str] {
    table
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}
