use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of analytics events kept in the persisted log.
pub const ANALYTICS_LOG_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Groceries,
    Fashion,
    Home,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Electronics,
        Category::Groceries,
        Category::Fashion,
        Category::Home,
        Category::Other,
    ];

    /// Lenient decode used for model output. Unknown labels fall back to `Other`.
    pub fn from_label(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().to_ascii_lowercase() == normalized)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Groceries => "Groceries",
            Category::Fashion => "Fashion",
            Category::Home => "Home",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    BuyNow,
    Wait,
    #[default]
    Caution,
}

impl Verdict {
    /// Accepts `BUY_NOW`, `buy now`, `Buy-Now` and friends. Anything else is `Caution`.
    pub fn from_label(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|ch| match ch {
                ' ' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "BUY_NOW" => Verdict::BuyNow,
            "WAIT" => Verdict::Wait,
            _ => Verdict::Caution,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::BuyNow => "BUY_NOW",
            Verdict::Wait => "WAIT",
            Verdict::Caution => "CAUTION",
        }
    }

    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub month: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailerSource {
    pub title: String,
    pub uri: String,
    pub trust_score: u8,
    pub delivery_charge: String,
    pub delivery_time: String,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_info: Option<String>,
    #[serde(default)]
    pub is_sponsored: bool,
    #[serde(default)]
    pub is_featured: bool,
}

/// One normalized answer. Built once per query and replaced wholesale by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub product_name: String,
    pub category: Category,
    pub current_found_price: String,
    pub market_average: String,
    pub verdict: Verdict,
    pub advice: String,
    pub price_history: Vec<PricePoint>,
    pub sources: Vec<RetailerSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_buy_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emi_options: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_cashback: Option<String>,
}

impl AnalysisResult {
    pub fn recommended_source(&self) -> Option<&RetailerSource> {
        self.sources.first()
    }

    pub fn other_sources(&self) -> &[RetailerSource] {
        self.sources.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    pub price: String,
    pub image: String,
    pub added_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_price: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsKind {
    Search,
    ClickBuy,
    TrackPrice,
}

impl AnalyticsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalyticsKind::Search => "SEARCH",
            AnalyticsKind::ClickBuy => "CLICK_BUY",
            AnalyticsKind::TrackPrice => "TRACK_PRICE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: AnalyticsKind,
    pub product_name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
}

/// Prepends `event` and keeps only the newest [`ANALYTICS_LOG_CAP`] entries.
pub fn push_analytics_event(log: &mut Vec<AnalyticsEvent>, event: AnalyticsEvent) {
    log.insert(0, event);
    log.truncate(ANALYTICS_LOG_CAP);
}
