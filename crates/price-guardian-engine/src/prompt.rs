use crate::location::GeoPoint;

/// Which instruction the user content gets paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Image,
    Url,
    Text,
}

impl TaskKind {
    /// A photo always wins; otherwise text that starts with `http` is treated as a link to verify.
    pub fn classify(has_image: bool, text: Option<&str>) -> Self {
        if has_image {
            return TaskKind::Image;
        }
        if text
            .map(|value| value.trim().starts_with("http"))
            .unwrap_or(false)
        {
            return TaskKind::Url;
        }
        TaskKind::Text
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Url => "url",
            TaskKind::Text => "text",
        }
    }
}

const RESPONSE_SCHEMA: &str = r#"{
  "productName": "string",
  "category": "Electronics" | "Groceries" | "Fashion" | "Home" | "Other",
  "currentFoundPrice": "string (৳ format)",
  "marketAverage": "string (৳ format)",
  "verdict": "BUY_NOW" | "WAIT" | "CAUTION",
  "advice": "Bengali advice on store choice and price trend",
  "bestBuyLink": "VERIFIED_URL",
  "productImageUrl": "VERIFIED_IMAGE_URL",
  "priceHistory": [{"month": "MonthName", "price": number}],
  "sources": [
    {
      "title": "Store Name",
      "uri": "VERIFIED_LIVE_URL",
      "trustScore": 1-5,
      "deliveryCharge": "৳ amount",
      "deliveryTime": "e.g. 1-3 days",
      "offers": ["string"],
      "isFeatured": boolean
    }
  ]
}"#;

pub fn location_context(location: Option<GeoPoint>) -> String {
    match location {
        Some(point) => point.to_string(),
        None => "Unknown".to_string(),
    }
}

pub fn system_instruction(location: Option<GeoPoint>) -> String {
    format!(
        "You are 'AI Price Guardian Pro', a shopping intelligence assistant for Bangladesh. \
Accuracy of prices and links is the only goal.\n\
\n\
Rules:\n\
1. Never guess or construct a product URL.\n\
2. Only return URIs that appear in today's search grounding results.\n\
3. For tech and laptops, look for listings on 'techmarvels.com.bd'; when one exists it must be the first source.\n\
4. Write the advice in Bengali. When Tech Marvels is suggested, mention verified warranty and competitive local pricing.\n\
5. Use live search for the current price.\n\
\n\
Reply with JSON only, no markdown and no extra text, in this shape:\n\
{RESPONSE_SCHEMA}\n\
\n\
LOCATION CONTEXT: {}.",
        location_context(location)
    )
}

pub fn task_instruction(kind: TaskKind, text: Option<&str>) -> String {
    let query = text.map(str::trim).unwrap_or_default();
    match kind {
        TaskKind::Image => "Identify this product precisely. Run a live Google Search for its current \
prices in Bangladesh. Prefer techmarvels.com.bd if it is an electronic item."
            .to_string(),
        TaskKind::Url => format!(
            "Verify this specific link: {query}. Check whether the price is still valid and find at \
least 2 other BD retailers for comparison."
        ),
        TaskKind::Text => format!(
            "Search for the current exact price of '{query}' across Bangladesh. Priority search: \
techmarvels.com.bd. Also check Star Tech and Ryans. Make sure every returned link is live and correct."
        ),
    }
}
