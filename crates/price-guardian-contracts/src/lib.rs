pub mod analysis;
pub mod chat;
pub mod events;
pub mod store;

pub use analysis::{
    push_analytics_event, AnalysisResult, AnalyticsEvent, AnalyticsKind, Category, PricePoint,
    RetailerSource, TrackedItem, Verdict, ANALYTICS_LOG_CAP,
};
