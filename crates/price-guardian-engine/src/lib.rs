pub mod affiliate;
pub mod analyzer;
pub mod capture;
pub mod config;
pub mod error;
pub mod gemini;
pub mod location;
pub mod normalize;
pub mod prompt;
pub mod session;

pub use analyzer::{AnalysisQuery, PriceGuardian, ProductAnalyzer};
pub use capture::{capture_image, capture_image_bytes, CapturedImage};
pub use config::GuardianConfig;
pub use error::{AnalysisError, SessionError, NO_DATA_MESSAGE};
pub use gemini::{DryrunModel, GeminiClient, GenerativeModel};
pub use location::{resolve_location, FixedLocation, GeoPoint, LocationSource};
pub use session::{OfferTarget, PendingAnalysis, Session, ViewState};

/// Unix epoch milliseconds, the timestamp unit of persisted collections.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
