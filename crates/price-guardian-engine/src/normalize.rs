use log::{debug, warn};
use price_guardian_contracts::{AnalysisResult, Category, PricePoint, RetailerSource, Verdict};
use serde_json::{Map, Value};

use crate::affiliate::{apply_affiliate, prioritize_sources};
use crate::error::{truncate_text, AnalysisError};

pub const PLACEHOLDER_PRODUCT_NAME: &str = "পণ্য পাওয়া গেছে";
pub const DEFAULT_ADVICE: &str = "বাজার যাচাই করে কেনা বুদ্ধিমানের কাজ হবে।";
pub const MISSING_PRICE: &str = "N/A";
pub const DEFAULT_TRUST_SCORE: u8 = 3;

/// What the model's text turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Decoded(Map<String, Value>),
    Malformed { snippet: String },
    Empty,
}

pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Ordered attempts: the fence-stripped text, then the first balanced
/// `{...}` span, then the widest `{...}` span. First success wins.
pub fn decode_payload(text: &str) -> DecodedPayload {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return DecodedPayload::Empty;
    }

    let mut candidates = vec![cleaned.clone()];
    if let Some(span) = first_balanced_object(text) {
        candidates.push(span.to_string());
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            candidates.push(text[start..=end].to_string());
        }
    }

    for candidate in candidates {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(object)) => return DecodedPayload::Decoded(object),
            Ok(Value::Null) => return DecodedPayload::Empty,
            Ok(_) | Err(_) => continue,
        }
    }
    DecodedPayload::Malformed {
        snippet: truncate_text(&cleaned, 160),
    }
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fills every field, tags links, reorders sources, then applies the
/// validation gate: no product name, no sources and no best-buy link is a failure.
pub fn normalize_payload(decoded: DecodedPayload) -> Result<AnalysisResult, AnalysisError> {
    let (object, malformed) = match decoded {
        DecodedPayload::Decoded(object) => (object, None),
        DecodedPayload::Empty => (Map::new(), None),
        DecodedPayload::Malformed { snippet } => {
            warn!("model output is not JSON, treating it as empty: {snippet}");
            (Map::new(), Some(snippet))
        }
    };

    let product_name = value_as_non_empty_string(object.get("productName"));
    let mut sources: Vec<RetailerSource> = object
        .get("sources")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(decode_source).collect())
        .unwrap_or_default();
    prioritize_sources(&mut sources);
    let best_buy_link =
        value_as_non_empty_string(object.get("bestBuyLink")).map(|link| apply_affiliate(&link));

    if product_name.is_none() && sources.is_empty() && best_buy_link.is_none() {
        return Err(match malformed {
            Some(snippet) => AnalysisError::Parse { snippet },
            None => AnalysisError::InsufficientData,
        });
    }

    let result = AnalysisResult {
        product_name: product_name.unwrap_or_else(|| PLACEHOLDER_PRODUCT_NAME.to_string()),
        category: value_as_non_empty_string(object.get("category"))
            .map(|raw| Category::from_label(&raw))
            .unwrap_or_default(),
        current_found_price: value_as_display_string(object.get("currentFoundPrice"))
            .unwrap_or_else(|| MISSING_PRICE.to_string()),
        market_average: value_as_display_string(object.get("marketAverage"))
            .unwrap_or_else(|| MISSING_PRICE.to_string()),
        verdict: value_as_non_empty_string(object.get("verdict"))
            .map(|raw| Verdict::from_label(&raw))
            .unwrap_or_default(),
        advice: value_as_non_empty_string(object.get("advice"))
            .unwrap_or_else(|| DEFAULT_ADVICE.to_string()),
        price_history: object
            .get("priceHistory")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(decode_price_point).collect())
            .unwrap_or_default(),
        sources,
        best_buy_link,
        product_image_url: value_as_non_empty_string(object.get("productImageUrl")),
        emi_options: value_as_display_string(object.get("emiOptions")),
        bank_cashback: value_as_display_string(object.get("bankCashback")),
    };
    debug!(
        "normalized {:?}: {} sources, {} history points",
        result.product_name,
        result.sources.len(),
        result.price_history.len()
    );
    Ok(result)
}

pub fn normalize_text(text: &str) -> Result<AnalysisResult, AnalysisError> {
    normalize_payload(decode_payload(text))
}

fn decode_source(value: &Value) -> Option<RetailerSource> {
    let row = value.as_object()?;
    let uri = value_as_non_empty_string(row.get("uri"))
        .map(|uri| apply_affiliate(&uri))
        .unwrap_or_default();
    Some(RetailerSource {
        title: value_as_non_empty_string(row.get("title")).unwrap_or_default(),
        uri,
        trust_score: row
            .get("trustScore")
            .and_then(value_as_f64)
            .map(|score| score.round().clamp(1.0, 5.0) as u8)
            .unwrap_or(DEFAULT_TRUST_SCORE),
        delivery_charge: value_as_display_string(row.get("deliveryCharge")).unwrap_or_default(),
        delivery_time: value_as_display_string(row.get("deliveryTime")).unwrap_or_default(),
        offers: value_as_string_list(row.get("offers")),
        branch_info: value_as_non_empty_string(row.get("branchInfo")),
        is_sponsored: row.get("isSponsored").and_then(value_as_bool).unwrap_or(false),
        is_featured: row.get("isFeatured").and_then(value_as_bool).unwrap_or(false),
    })
}

fn decode_price_point(value: &Value) -> Option<PricePoint> {
    let row = value.as_object()?;
    let month = value_as_display_string(row.get("month"))?;
    let price = row.get("price").and_then(value_as_f64)?;
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    Some(PricePoint { month, price })
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Strings as-is, numbers printed without a trailing `.0`.
fn value_as_display_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(number) => Some(match number.as_i64() {
            Some(whole) => whole.to_string(),
            None => number.to_string(),
        }),
        other => value_as_non_empty_string(Some(other)),
    }
}

/// Numbers, or the first number inside strings like `"Tk. 1,24,500"`.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => leading_number(raw),
        _ => None,
    }
}

/// Skips any currency prefix, then reads one token of digits, `,` group
/// separators and at most one decimal point. A `-` right before it negates it.
fn leading_number(raw: &str) -> Option<f64> {
    let start = raw.find(|ch: char| ch.is_ascii_digit())?;
    let negative = raw[..start].ends_with('-');
    let mut token = String::new();
    let mut seen_dot = false;
    let mut chars = raw[start..].chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '0'..='9' => token.push(ch),
            ',' => {}
            '.' if !seen_dot && chars.peek().map(char::is_ascii_digit).unwrap_or(false) => {
                seen_dot = true;
                token.push('.');
            }
            _ => break,
        }
    }
    let value = token.parse::<f64>().ok()?;
    Some(if negative { -value } else { value })
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        _ => None,
    }
}

fn value_as_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| value_as_non_empty_string(Some(row)))
            .collect(),
        Some(single @ Value::String(_)) => value_as_non_empty_string(Some(single))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}
