use std::time::Instant;

use log::{info, warn};
use price_guardian_contracts::AnalysisResult;

use crate::capture::CapturedImage;
use crate::error::AnalysisError;
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::location::GeoPoint;
use crate::normalize::normalize_text;
use crate::prompt::{system_instruction, task_instruction, TaskKind};

/// What the user asked about: a photo, some text, or both (the photo wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisQuery {
    pub image: Option<CapturedImage>,
    pub text: Option<String>,
    pub location: Option<GeoPoint>,
}

impl AnalysisQuery {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        Self {
            text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            ..Self::default()
        }
    }

    pub fn from_image(image: CapturedImage) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: Option<GeoPoint>) -> Self {
        self.location = location;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self
                .text
                .as_deref()
                .map(|text| text.trim().is_empty())
                .unwrap_or(true)
    }

    pub fn task_kind(&self) -> TaskKind {
        TaskKind::classify(self.image.is_some(), self.text.as_deref())
    }

    /// Short label for logs and the activity journal.
    pub fn describe(&self) -> String {
        match self.task_kind() {
            TaskKind::Image => "photo".to_string(),
            TaskKind::Url | TaskKind::Text => self.text.clone().unwrap_or_default(),
        }
    }
}

/// Turns a query into a normalized result. One call, one upstream round trip.
pub trait ProductAnalyzer {
    fn analyze(&self, query: &AnalysisQuery) -> Result<AnalysisResult, AnalysisError>;
}

pub struct PriceGuardian {
    model: Box<dyn GenerativeModel>,
    model_name: String,
}

impl PriceGuardian {
    pub fn new(model: Box<dyn GenerativeModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    pub fn provider(&self) -> &str {
        self.model.name()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn build_request(&self, query: &AnalysisQuery) -> GenerateRequest {
        let kind = query.task_kind();
        let prompt = task_instruction(kind, query.text.as_deref());
        GenerateRequest {
            model: self.model_name.clone(),
            system_instruction: system_instruction(query.location),
            image: match kind {
                TaskKind::Image => query.image.clone(),
                TaskKind::Url | TaskKind::Text => None,
            },
            prompt,
            search_grounding: true,
        }
    }
}

impl ProductAnalyzer for PriceGuardian {
    fn analyze(&self, query: &AnalysisQuery) -> Result<AnalysisResult, AnalysisError> {
        if query.is_empty() {
            return Err(AnalysisError::InsufficientData);
        }
        let request = self.build_request(query);
        let started = Instant::now();
        let text = self.model.generate(&request).map_err(|err| {
            warn!("{} request failed: {err}", self.model.name());
            err
        })?;
        info!(
            "{} answered {} query in {:.1}s",
            self.model.name(),
            query.task_kind().as_str(),
            started.elapsed().as_secs_f64()
        );
        normalize_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::capture::CapturedImage;
    use crate::error::AnalysisError;
    use crate::gemini::{DryrunModel, GenerateRequest, GenerativeModel};
    use crate::location::GeoPoint;
    use crate::prompt::TaskKind;

    use super::{AnalysisQuery, PriceGuardian, ProductAnalyzer};

    struct RecordingModel {
        answer: Result<String, AnalysisError>,
        seen: std::sync::Arc<Mutex<Vec<GenerateRequest>>>,
    }

    impl GenerativeModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        fn generate(&self, request: &GenerateRequest) -> Result<String, AnalysisError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            self.answer.clone()
        }
    }

    fn recording(answer: Result<String, AnalysisError>) -> (PriceGuardian, std::sync::Arc<Mutex<Vec<GenerateRequest>>>) {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let model = RecordingModel {
            answer,
            seen: seen.clone(),
        };
        (PriceGuardian::new(Box::new(model), "gemini-test"), seen)
    }

    #[test]
    fn query_from_blank_text_is_empty() {
        assert!(AnalysisQuery::from_text("   ").is_empty());
        assert!(AnalysisQuery::default().is_empty());
        assert!(!AnalysisQuery::from_text("rice").is_empty());
        let photo = AnalysisQuery::from_image(CapturedImage::from_bytes(b"x", "image/jpeg"));
        assert!(!photo.is_empty());
        assert_eq!(photo.task_kind(), TaskKind::Image);
        assert_eq!(photo.describe(), "photo");
    }

    #[test]
    fn text_query_issues_exactly_one_grounded_request() -> anyhow::Result<()> {
        let (guardian, seen) = recording(Ok(r#"{"productName": "Rice"}"#.to_string()));
        let query = AnalysisQuery::from_text("miniket rice 5kg")
            .with_location(Some(GeoPoint::new(23.8, 90.4)?));
        let result = guardian.analyze(&query)?;
        assert_eq!(result.product_name, "Rice");

        let requests = seen.lock().map(|rows| rows.clone()).unwrap_or_default();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gemini-test");
        assert!(request.search_grounding);
        assert!(request.image.is_none());
        assert!(request.prompt.contains("'miniket rice 5kg'"));
        assert!(request
            .system_instruction
            .ends_with("LOCATION CONTEXT: Latitude: 23.8, Longitude: 90.4."));
        Ok(())
    }

    #[test]
    fn image_query_ignores_text_and_sends_photo() {
        let (guardian, _) = recording(Ok("{}".to_string()));
        let mut query = AnalysisQuery::from_image(CapturedImage::from_bytes(b"jpg", "image/jpeg"));
        query.text = Some("https://shop.bd/p".to_string());
        let request = guardian.build_request(&query);
        assert!(request.image.is_some());
        assert!(request.prompt.starts_with("Identify this product precisely."));
        assert!(request.system_instruction.ends_with("LOCATION CONTEXT: Unknown."));
    }

    #[test]
    fn url_query_uses_verification_instruction() {
        let (guardian, _) = recording(Ok("{}".to_string()));
        let request = guardian.build_request(&AnalysisQuery::from_text("https://daraz.com.bd/p/1"));
        assert!(request
            .prompt
            .starts_with("Verify this specific link: https://daraz.com.bd/p/1."));
    }

    #[test]
    fn upstream_error_propagates_unmodified() {
        let failure = AnalysisError::upstream("Gemini request failed (503): overloaded");
        let (guardian, _) = recording(Err(failure.clone()));
        assert_eq!(
            guardian.analyze(&AnalysisQuery::from_text("tv")),
            Err(failure)
        );
    }

    #[test]
    fn empty_query_never_reaches_the_model() {
        let (guardian, seen) = recording(Ok("{}".to_string()));
        assert_eq!(
            guardian.analyze(&AnalysisQuery::default()),
            Err(AnalysisError::InsufficientData)
        );
        assert!(seen.lock().map(|rows| rows.is_empty()).unwrap_or(false));
    }

    #[test]
    fn dryrun_model_produces_a_full_result() -> anyhow::Result<()> {
        let guardian = PriceGuardian::new(Box::new(DryrunModel::new()), "dryrun");
        let result = guardian.analyze(&AnalysisQuery::from_text("iphone 15"))?;
        assert_eq!(guardian.provider(), "dryrun");
        assert_eq!(result.sources[0].title, "Tech Marvels BD");
        assert_eq!(result.sources[1].title, "Star Tech");
        assert!(result.sources[2].uri.contains("ref=ryans_home"));
        assert_eq!(result.price_history.len(), 4);
        Ok(())
    }
}
