//! Typed extraction results and field normalization.
//!
//! The extraction service answers with a loosely-shaped JSON object. It is
//! converted into `ExtractedAttributes` right at the boundary: every field is
//! validated on its own, and a field that cannot be understood becomes absent
//! instead of failing the message.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ValidationError;

/// Two-digit years from here up belong to the previous century (69 → 1969).
const TWO_DIGIT_YEAR_PIVOT: i32 = 2069;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));

/// A number written next to a currency marker: "€ 450", "450€", "450 euro".
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)€\s*(\d[\d.,]*)|(\d[\d.,]*)\s*(?:€|eur\b|euro\b|euros\b)")
        .expect("valid regex")
});

// ── Enums ───────────────────────────────────────────────────────────

/// Property category of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    SingleRoom,
    SharedRoom,
    Apartment,
    Studio,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleRoom => "single_room",
            Self::SharedRoom => "shared_room",
            Self::Apartment => "apartment",
            Self::Studio => "studio",
        }
    }
}

impl FromStr for PropertyType {
    type Err = ValidationError;

    /// Accepts canonical values and the Italian labels used by the channel.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "single_room" | "camera_singola" => Ok(Self::SingleRoom),
            "shared_room" | "double_room" | "camera_doppia" => Ok(Self::SharedRoom),
            "apartment" | "appartamento" => Ok(Self::Apartment),
            "studio" | "monolocale" => Ok(Self::Studio),
            _ => Err(ValidationError {
                field: "property_type",
                value: s.to_string(),
                reason: "unknown property category",
            }),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the landlord wants as tenant. Always exactly one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantPreference {
    Male,
    Female,
    #[default]
    Indifferent,
}

impl TenantPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Indifferent => "indifferent",
        }
    }

    /// Exact match against the three canonical values.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "indifferent" => Some(Self::Indifferent),
            _ => None,
        }
    }
}

impl fmt::Display for TenantPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Attributes ──────────────────────────────────────────────────────

/// Structured attributes extracted from one listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAttributes {
    /// Monthly price in euros.
    pub price: Option<f64>,
    /// Street if present, otherwise a named zone.
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub tenant_preference: TenantPreference,
    pub available_start: Option<NaiveDate>,
    pub available_end: Option<NaiveDate>,
    pub num_bedrooms: Option<u32>,
    pub num_bathrooms: Option<u32>,
    pub flatmates_count: Option<u32>,
    /// Free-text summary of amenities and conditions.
    pub summary: Option<String>,
    pub has_extra_expenses: Option<bool>,
    pub extra_expenses_details: Option<String>,
}

impl ExtractedAttributes {
    /// Build typed attributes from a parsed response object.
    ///
    /// Missing or invalid fields become absent; the tenant preference is
    /// always re-normalized.
    pub fn from_json(map: &Map<String, Value>) -> Self {
        let get = |key: &str| map.get(key).filter(|v| !v.is_null());

        Self {
            price: field(get("price").map(parse_price)),
            location: get("location").and_then(parse_text),
            property_type: field(get("property_type").map(parse_property_type)),
            telephone: get("telephone").and_then(parse_text),
            email: get("email").and_then(parse_text),
            tenant_preference: normalize_tenant_preference(
                get("tenant_preference").and_then(Value::as_str),
            ),
            available_start: field(get("available_start").map(|v| parse_date_value("available_start", v))),
            available_end: field(get("available_end").map(|v| parse_date_value("available_end", v))),
            num_bedrooms: field(get("num_bedrooms").map(|v| parse_count("num_bedrooms", v))),
            num_bathrooms: field(get("num_bathrooms").map(|v| parse_count("num_bathrooms", v))),
            flatmates_count: field(get("flatmates_count").map(|v| parse_count("flatmates_count", v))),
            summary: get("summary").and_then(parse_text),
            has_extra_expenses: field(get("has_extra_expenses").map(parse_flag)),
            extra_expenses_details: get("extra_expenses_details").and_then(parse_text),
        }
    }

    /// True when no field beyond the default tenant preference was extracted.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Collapse a field validation result to an optional value, logging failures.
fn field<T>(result: Option<Result<T, ValidationError>>) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(field = e.field, error = %e, "Dropping invalid extracted field");
            None
        }
    }
}

// ── Normalizers ─────────────────────────────────────────────────────

/// Reduce a free-form tenant preference to exactly one canonical value.
///
/// Lower-cases the input, treats `/` and `|` as `,`, and returns the first
/// comma-separated token that exactly matches a valid value. Anything else,
/// including empty input, yields `Indifferent`.
pub fn normalize_tenant_preference(raw: Option<&str>) -> TenantPreference {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return TenantPreference::Indifferent;
    };

    raw.to_lowercase()
        .replace(['/', '|'], ",")
        .split(',')
        .find_map(|part| TenantPreference::from_token(part.trim()))
        .unwrap_or(TenantPreference::Indifferent)
}

/// Parse a `YY-MM-DD` or `YYYY-MM-DD` date. Unparseable input yields `None`.
///
/// Two-digit years 69-99 map to 1969-1999 and 00-68 to 2000-2068. Signed
/// years are rejected.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if !raw.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%y-%m-%d") {
        return if date.year() >= TWO_DIGIT_YEAR_PIVOT {
            date.with_year(date.year() - 100)
        } else {
            Some(date)
        };
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn parse_date_value(name: &'static str, value: &Value) -> Result<NaiveDate, ValidationError> {
    value
        .as_str()
        .and_then(parse_date)
        .ok_or_else(|| invalid(name, value, "not a YY-MM-DD or YYYY-MM-DD date"))
}

fn parse_price(value: &Value) -> Result<f64, ValidationError> {
    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(s),
        _ => None,
    };
    price
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| invalid("price", value, "not a non-negative amount"))
}

/// Pull the amount out of decorated text ("450€", "1.200 euro", "450,50").
///
/// A number next to a currency marker wins; otherwise the first number.
fn parse_decimal(text: &str) -> Option<f64> {
    let token = CURRENCY_RE
        .captures(text)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .or_else(|| NUMBER_RE.find(text))?
        .as_str()
        .trim_end_matches(['.', ',']);

    let normalized = match (token.contains('.'), token.contains(',')) {
        (true, true) => token.replace('.', "").replace(',', "."),
        (true, false) if is_thousands_grouped(token, '.') => token.replace('.', ""),
        (false, true) if is_thousands_grouped(token, ',') => token.replace(',', ""),
        (false, true) => token.replace(',', "."),
        _ => token.to_string(),
    };
    normalized.parse().ok()
}

/// "1.200" / "12.500.000": every group after the first has three digits.
fn is_thousands_grouped(token: &str, sep: char) -> bool {
    let mut groups = token.split(sep);
    let first_ok = groups.next().is_some_and(|g| !g.is_empty() && g.len() <= 3);
    let rest: Vec<&str> = groups.collect();
    first_ok && !rest.is_empty() && rest.iter().all(|g| g.len() == 3)
}

fn parse_count(name: &'static str, value: &Value) -> Result<u32, ValidationError> {
    let count = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    count
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| invalid(name, value, "not a non-negative integer"))
}

fn parse_flag(value: &Value) -> Result<bool, ValidationError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            _ => Err(invalid("has_extra_expenses", value, "not a boolean")),
        },
        _ => Err(invalid("has_extra_expenses", value, "not a boolean")),
    }
}

fn parse_property_type(value: &Value) -> Result<PropertyType, ValidationError> {
    value
        .as_str()
        .ok_or_else(|| invalid("property_type", value, "not a string"))?
        .parse()
}

/// Non-empty text, with placeholder values treated as absent.
fn parse_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(text),
    }
}

fn invalid(field: &'static str, value: &Value, reason: &'static str) -> ValidationError {
    ValidationError {
        field,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> ExtractedAttributes {
        ExtractedAttributes::from_json(value.as_object().unwrap())
    }

    // ── Tenant preference ───────────────────────────────────────────

    #[test]
    fn tenant_preference_first_valid_token_wins() {
        assert_eq!(
            normalize_tenant_preference(Some("female, male")),
            TenantPreference::Female
        );
        assert_eq!(
            normalize_tenant_preference(Some("male/female")),
            TenantPreference::Male
        );
        assert_eq!(
            normalize_tenant_preference(Some("unknown | female | male")),
            TenantPreference::Female
        );
    }

    #[test]
    fn tenant_preference_is_case_insensitive() {
        assert_eq!(
            normalize_tenant_preference(Some("  FEMALE ")),
            TenantPreference::Female
        );
        assert_eq!(
            normalize_tenant_preference(Some("Male")),
            TenantPreference::Male
        );
    }

    #[test]
    fn tenant_preference_defaults_to_indifferent() {
        assert_eq!(normalize_tenant_preference(None), TenantPreference::Indifferent);
        assert_eq!(normalize_tenant_preference(Some("")), TenantPreference::Indifferent);
        assert_eq!(
            normalize_tenant_preference(Some("students only")),
            TenantPreference::Indifferent
        );
        // Substrings do not count as a match.
        assert_eq!(
            normalize_tenant_preference(Some("males preferred")),
            TenantPreference::Indifferent
        );
    }

    #[test]
    fn tenant_preference_non_string_is_indifferent() {
        let a = attrs(json!({ "tenant_preference": 3 }));
        assert_eq!(a.tenant_preference, TenantPreference::Indifferent);
    }

    // ── Dates ───────────────────────────────────────────────────────

    #[test]
    fn parse_two_digit_year() {
        assert_eq!(parse_date("25-09-01"), NaiveDate::from_ymd_opt(2025, 9, 1));
    }

    #[test]
    fn parse_four_digit_year() {
        assert_eq!(parse_date("2026-01-31"), NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(parse_date("1999-12-31"), NaiveDate::from_ymd_opt(1999, 12, 31));
    }

    #[test]
    fn date_round_trips_in_both_formats() {
        for (y, m, d) in [(2024, 2, 29), (2025, 1, 1), (2030, 12, 31)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let short = format!("{:02}-{:02}-{:02}", y % 100, m, d);
            let long = format!("{y:04}-{m:02}-{d:02}");
            assert_eq!(parse_date(&short), Some(date), "{short}");
            assert_eq!(parse_date(&long), Some(date), "{long}");
        }
    }

    #[test]
    fn two_digit_year_pivots_at_69() {
        assert_eq!(parse_date("68-01-01"), NaiveDate::from_ymd_opt(2068, 1, 1));
        assert_eq!(parse_date("69-01-01"), NaiveDate::from_ymd_opt(1969, 1, 1));
        assert_eq!(parse_date("99-12-31"), NaiveDate::from_ymd_opt(1999, 12, 31));
    }

    #[test]
    fn invalid_dates_yield_none() {
        for raw in [
            "",
            "soon",
            "2025/09/01",
            "25-13-01",
            "2025-02-30",
            "01-09-2025x",
            "+2025-09-01",
            "-25-09-01",
        ] {
            assert_eq!(parse_date(raw), None, "{raw}");
        }
    }

    // ── Numbers ─────────────────────────────────────────────────────

    #[test]
    fn price_accepts_numbers_and_decorated_strings() {
        assert_eq!(attrs(json!({ "price": 450 })).price, Some(450.0));
        assert_eq!(attrs(json!({ "price": "550€" })).price, Some(550.0));
        assert_eq!(attrs(json!({ "price": "€ 450,50" })).price, Some(450.5));
        assert_eq!(attrs(json!({ "price": "1.200 euro" })).price, Some(1200.0));
    }

    #[test]
    fn price_prefers_amount_next_to_currency() {
        assert_eq!(attrs(json!({ "price": "2-3 persone, 450€" })).price, Some(450.0));
        assert_eq!(attrs(json!({ "price": "stanza 2, € 380" })).price, Some(380.0));
        assert_eq!(
            attrs(json!({ "price": "4 posti a 520 euro al mese" })).price,
            Some(520.0)
        );
    }

    #[test]
    fn invalid_price_becomes_absent() {
        assert_eq!(attrs(json!({ "price": "da concordare" })).price, None);
        assert_eq!(attrs(json!({ "price": -10 })).price, None);
        assert_eq!(attrs(json!({ "price": true })).price, None);
    }

    #[test]
    fn counts_accept_integral_values_only() {
        let a = attrs(json!({
            "num_bedrooms": 3,
            "num_bathrooms": "2",
            "flatmates_count": 2.0
        }));
        assert_eq!(a.num_bedrooms, Some(3));
        assert_eq!(a.num_bathrooms, Some(2));
        assert_eq!(a.flatmates_count, Some(2));

        let b = attrs(json!({ "num_bedrooms": 1.5, "num_bathrooms": -1, "flatmates_count": "tre" }));
        assert_eq!(b.num_bedrooms, None);
        assert_eq!(b.num_bathrooms, None);
        assert_eq!(b.flatmates_count, None);
    }

    // ── Categorical / text ──────────────────────────────────────────

    #[test]
    fn property_type_accepts_canonical_and_italian_labels() {
        assert_eq!("single_room".parse::<PropertyType>(), Ok(PropertyType::SingleRoom));
        assert_eq!("Camera Doppia".parse::<PropertyType>(), Ok(PropertyType::SharedRoom));
        assert_eq!("appartamento".parse::<PropertyType>(), Ok(PropertyType::Apartment));
        assert_eq!("monolocale".parse::<PropertyType>(), Ok(PropertyType::Studio));
        assert!("villa".parse::<PropertyType>().is_err());
    }

    #[test]
    fn extra_expenses_flag_accepts_string_booleans() {
        assert_eq!(attrs(json!({ "has_extra_expenses": "true" })).has_extra_expenses, Some(true));
        assert_eq!(attrs(json!({ "has_extra_expenses": false })).has_extra_expenses, Some(false));
        assert_eq!(attrs(json!({ "has_extra_expenses": "maybe" })).has_extra_expenses, None);
    }

    #[test]
    fn text_placeholders_are_absent() {
        let a = attrs(json!({ "location": "null", "email": "  ", "telephone": "3331234567" }));
        assert_eq!(a.location, None);
        assert_eq!(a.email, None);
        assert_eq!(a.telephone.as_deref(), Some("3331234567"));
    }

    #[test]
    fn full_object_maps_every_field() {
        let a = attrs(json!({
            "price": 520,
            "location": "Via Pascoli 12",
            "property_type": "single_room",
            "telephone": "+39 333 1234567",
            "email": "host@example.com",
            "tenant_preference": "female",
            "available_start": "25-09-01",
            "available_end": "2026-07-31",
            "num_bedrooms": 3,
            "num_bathrooms": 1,
            "flatmates_count": 2,
            "summary": "Furnished, wifi included",
            "has_extra_expenses": true,
            "extra_expenses_details": "50€ condominium"
        }));

        assert_eq!(a.price, Some(520.0));
        assert_eq!(a.location.as_deref(), Some("Via Pascoli 12"));
        assert_eq!(a.property_type, Some(PropertyType::SingleRoom));
        assert_eq!(a.tenant_preference, TenantPreference::Female);
        assert_eq!(a.available_start, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(a.available_end, NaiveDate::from_ymd_opt(2026, 7, 31));
        assert_eq!(a.flatmates_count, Some(2));
        assert_eq!(a.has_extra_expenses, Some(true));
        assert!(!a.is_empty());
    }

    #[test]
    fn empty_object_is_empty_attributes() {
        let a = attrs(json!({}));
        assert!(a.is_empty());
        assert_eq!(a.tenant_preference, TenantPreference::Indifferent);
    }
}
