use anyhow::{bail, Context, Result};
use log::{debug, info};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::capture::CapturedImage;
use crate::config::GuardianConfig;
use crate::error::{truncate_text, AnalysisError};

/// One "generate content" call: instructions, user content and the grounding flag.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub image: Option<CapturedImage>,
    pub prompt: String,
    pub search_grounding: bool,
}

/// Upstream text model. Returns the raw text the model produced.
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<String, AnalysisError>;
}

pub struct GeminiClient {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        // Grounded searches routinely outlive reqwest's default 30s budget.
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|value| !value.trim().is_empty()),
            http,
        })
    }

    pub fn from_config(config: &GuardianConfig) -> Result<Self> {
        Self::new(config.api_base.clone(), config.api_key.clone())
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, request: &GenerateRequest) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = build_request_payload(request);
        info!(
            "requesting {} (image: {} b64 bytes, grounding: {})",
            endpoint,
            request
                .image
                .as_ref()
                .map(CapturedImage::encoded_len)
                .unwrap_or(0),
            request.search_grounding
        );

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let text = extract_response_text(&response_payload);
        debug!("Gemini returned {} chars", text.chars().count());
        Ok(text)
    }
}

impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String, AnalysisError> {
        self.post(request)
            .map_err(|err| AnalysisError::from_anyhow(&err))
    }
}

/// Body for `models/<model>:generateContent`.
pub fn build_request_payload(request: &GenerateRequest) -> Value {
    let mut parts = Vec::new();
    if let Some(image) = request.image.as_ref() {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": image.data,
            }
        }));
    }
    parts.push(json!({ "text": request.prompt }));

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    payload.insert(
        "systemInstruction".to_string(),
        json!({ "parts": [{ "text": request.system_instruction }] }),
    );
    payload.insert(
        "generationConfig".to_string(),
        json!({ "responseMimeType": "application/json" }),
    );
    if request.search_grounding {
        payload.insert("tools".to_string(), json!([{ "googleSearch": {} }]));
    }
    Value::Object(payload)
}

/// Concatenates every text part of every candidate. No text at all reads as `{}`.
pub fn extract_response_text(response_payload: &Value) -> String {
    let mut text = String::new();
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                text.push_str(chunk);
            }
        }
    }
    if text.trim().is_empty() {
        return "{}".to_string();
    }
    text
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

const DRYRUN_PAYLOAD: &str = r#"```json
{
  "productName": "Apple iPhone 15 (128GB)",
  "category": "Electronics",
  "currentFoundPrice": "৳ 1,24,500",
  "marketAverage": "৳ 1,31,000",
  "verdict": "BUY_NOW",
  "advice": "Tech Marvels-এ যাচাইকৃত ওয়ারেন্টিসহ দাম বাজারের গড়ের চেয়ে কম।",
  "bestBuyLink": "https://techmarvels.com.bd/product/iphone-15-128gb",
  "priceHistory": [
    {"month": "July", "price": 134000},
    {"month": "August", "price": 131500},
    {"month": "September", "price": 127000},
    {"month": "October", "price": 124500}
  ],
  "sources": [
    {"title": "Star Tech", "uri": "https://www.startech.com.bd/apple-iphone-15", "trustScore": 5, "deliveryCharge": "৳ 60", "deliveryTime": "1-2 days"},
    {"title": "Tech Marvels BD", "uri": "https://techmarvels.com.bd/product/iphone-15-128gb", "trustScore": 5, "deliveryCharge": "৳ 0", "deliveryTime": "Same day", "isFeatured": true},
    {"title": "Ryans", "uri": "https://www.ryans.com/apple-iphone-15?ref=ryans_home", "trustScore": 4, "deliveryCharge": "৳ 100", "deliveryTime": "2-3 days"}
  ]
}
```"#;

/// Offline stand-in for the upstream model; answers every request with one fixed payload.
#[derive(Debug, Clone)]
pub struct DryrunModel {
    payload: String,
}

impl DryrunModel {
    pub fn new() -> Self {
        Self::with_payload(DRYRUN_PAYLOAD)
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl Default for DryrunModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerativeModel for DryrunModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String, AnalysisError> {
        debug!("dryrun answer for {:?}", truncate_text(&request.prompt, 80));
        Ok(self.payload.clone())
    }
}
