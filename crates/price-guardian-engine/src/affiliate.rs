use price_guardian_contracts::RetailerSource;
use url::Url;

pub const UTM_SOURCE: (&str, &str) = ("utm_source", "price_guardian");
pub const AFFILIATE_ID: (&str, &str) = ("aff_id", "gp_2025");
pub const REF_TAG: (&str, &str) = ("ref", "price_guardian_pro_2025");

pub const PREFERRED_RETAILER_DOMAIN: &str = "techmarvels.com.bd";
pub const PREFERRED_RETAILER_BRAND: &str = "tech marvel";

/// Tags an outbound retailer link.
///
/// `utm_source` and `aff_id` are always set; `ref` is only added when the link
/// has none. Anything that does not start with `http` or fails to parse is
/// returned untouched.
pub fn apply_affiliate(raw: &str) -> String {
    if !raw.starts_with("http") {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    set_query_param(&mut pairs, UTM_SOURCE.0, UTM_SOURCE.1);
    set_query_param(&mut pairs, AFFILIATE_ID.0, AFFILIATE_ID.1);
    if !pairs.iter().any(|(key, _)| key == REF_TAG.0) {
        pairs.push((REF_TAG.0.to_string(), REF_TAG.1.to_string()));
    }
    url.query_pairs_mut().clear().extend_pairs(&pairs);
    url.to_string()
}

/// Replaces the first `key`, drops later duplicates, appends when absent.
fn set_query_param(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    let Some(first) = pairs.iter().position(|(existing, _)| existing == key) else {
        pairs.push((key.to_string(), value.to_string()));
        return;
    };
    pairs[first].1 = value.to_string();
    let mut idx = 0;
    pairs.retain(|(existing, _)| {
        let keep = existing != key || idx == first;
        idx += 1;
        keep
    });
}

pub fn is_preferred_retailer(source: &RetailerSource) -> bool {
    source
        .uri
        .to_lowercase()
        .contains(PREFERRED_RETAILER_DOMAIN)
        || source
            .title
            .to_lowercase()
            .contains(PREFERRED_RETAILER_BRAND)
}

/// Moves preferred-retailer listings to the front. Stable otherwise.
pub fn prioritize_sources(sources: &mut [RetailerSource]) {
    sources.sort_by_key(|source| !is_preferred_retailer(source));
}
