use log::{debug, info, warn};
use price_guardian_contracts::events::EventWriter;
use price_guardian_contracts::store::CollectionStore;
use price_guardian_contracts::{
    push_analytics_event, AnalysisResult, AnalyticsEvent, AnalyticsKind, TrackedItem,
};
use serde_json::{json, Map, Value};
use url::Url;
use uuid::Uuid;

use crate::analyzer::{AnalysisQuery, ProductAnalyzer};
use crate::error::{AnalysisError, SessionError};
use crate::now_millis;

/// Which screen the user is looking at.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    Analyzing,
    Result(AnalysisResult),
    Error(AnalysisError),
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::Idle => "IDLE",
            ViewState::Analyzing => "ANALYZING",
            ViewState::Result(_) => "RESULT",
            ViewState::Error(_) => "ERROR",
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            ViewState::Result(result) => Some(result),
            _ => None,
        }
    }
}

/// Handle for the single in-flight analysis. Only the holder can finish it.
#[derive(Debug)]
pub struct PendingAnalysis {
    ticket: u64,
    query: AnalysisQuery,
}

impl PendingAnalysis {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn query(&self) -> &AnalysisQuery {
        &self.query
    }
}

/// Outbound link the user asked to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferTarget {
    BestBuy,
    Source(usize),
}

pub struct Session {
    state: ViewState,
    in_flight: Option<u64>,
    next_ticket: u64,
    scroll_offset: usize,
    watchlist: Vec<TrackedItem>,
    analytics: Vec<AnalyticsEvent>,
    watchlist_store: Box<dyn CollectionStore<TrackedItem>>,
    analytics_store: Box<dyn CollectionStore<AnalyticsEvent>>,
    events: EventWriter,
}

impl Session {
    /// Loads both collections once. Later mutations overwrite them wholesale.
    pub fn new(
        watchlist_store: Box<dyn CollectionStore<TrackedItem>>,
        analytics_store: Box<dyn CollectionStore<AnalyticsEvent>>,
        events: EventWriter,
    ) -> anyhow::Result<Self> {
        let watchlist = watchlist_store.load()?;
        let analytics = analytics_store.load()?;
        let session = Self {
            state: ViewState::Idle,
            in_flight: None,
            next_ticket: 1,
            scroll_offset: 0,
            watchlist,
            analytics,
            watchlist_store,
            analytics_store,
            events,
        };
        session.journal(
            "session_started",
            json!({
                "tracked_items": session.watchlist.len(),
                "analytics_events": session.analytics.len(),
            }),
        );
        Ok(session)
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn watchlist(&self) -> &[TrackedItem] {
        &self.watchlist
    }

    pub fn analytics(&self) -> &[AnalyticsEvent] {
        &self.analytics
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn begin_analysis(&mut self, query: AnalysisQuery) -> Result<PendingAnalysis, SessionError> {
        match self.state {
            ViewState::Idle => {}
            ViewState::Analyzing => return Err(SessionError::Busy),
            ViewState::Result(_) | ViewState::Error(_) => return Err(SessionError::NotIdle),
        }
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.state = ViewState::Analyzing;
        self.journal_analysis(
            ticket,
            "analysis_started",
            json!({
                "task": query.task_kind().as_str(),
                "query": query.describe(),
                "located": query.location.is_some(),
            }),
        );
        Ok(PendingAnalysis { ticket, query })
    }

    pub fn finish_analysis(
        &mut self,
        pending: PendingAnalysis,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> Result<&ViewState, SessionError> {
        if self.in_flight != Some(pending.ticket) {
            return Err(SessionError::StalePending(pending.ticket));
        }
        self.in_flight = None;

        match outcome {
            Ok(result) => {
                info!(
                    "analysis {} found {:?} with {} sources",
                    pending.ticket,
                    result.product_name,
                    result.sources.len()
                );
                self.journal_analysis(
                    pending.ticket,
                    "analysis_completed",
                    json!({
                        "product_name": result.product_name,
                        "category": result.category.as_str(),
                        "verdict": result.verdict.as_str(),
                        "sources": result.sources.len(),
                    }),
                );
                let event = AnalyticsEvent {
                    timestamp: now_millis(),
                    kind: AnalyticsKind::Search,
                    product_name: result.product_name.clone(),
                    category: result.category.as_str().to_string(),
                    retailer: None,
                };
                self.scroll_offset = 0;
                self.state = ViewState::Result(result);
                if let Err(err) = self.record_analytics(event) {
                    warn!("failed to persist search analytics: {err:#}");
                }
            }
            Err(err) => {
                warn!("analysis {} failed ({}): {err}", pending.ticket, err.kind());
                self.journal_analysis(
                    pending.ticket,
                    "analysis_failed",
                    json!({
                        "kind": err.kind(),
                        "detail": err.to_string(),
                    }),
                );
                self.state = ViewState::Error(err);
            }
        }
        Ok(&self.state)
    }

    /// Runs one analysis to completion. The call blocks until the analyzer returns.
    pub fn analyze(
        &mut self,
        analyzer: &dyn ProductAnalyzer,
        query: AnalysisQuery,
    ) -> Result<&ViewState, SessionError> {
        let pending = self.begin_analysis(query)?;
        let outcome = analyzer.analyze(pending.query());
        self.finish_analysis(pending, outcome)
    }

    /// "New Search".
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, ViewState::Analyzing) {
            return Err(SessionError::Busy);
        }
        debug!("reset from {}", self.state.name());
        self.state = ViewState::Idle;
        self.scroll_offset = 0;
        Ok(())
    }

    pub fn is_tracked(&self) -> bool {
        self.state
            .result()
            .map(|result| self.tracked_position(&result.product_name).is_some())
            .unwrap_or(false)
    }

    /// Pins or unpins the current product. Returns whether it is tracked afterwards.
    pub fn toggle_track(&mut self) -> Result<bool, SessionError> {
        let result = self.state.result().cloned().ok_or(SessionError::NoResult)?;

        let tracked = if self.tracked_position(&result.product_name).is_some() {
            self.watchlist
                .retain(|item| item.name != result.product_name);
            self.watchlist_store.save(&self.watchlist)?;
            false
        } else {
            let item = TrackedItem {
                id: Uuid::new_v4().to_string(),
                name: result.product_name.clone(),
                price: result.current_found_price.clone(),
                image: result.product_image_url.clone().unwrap_or_default(),
                added_at: now_millis(),
                alert_price: None,
            };
            self.watchlist.insert(0, item);
            self.watchlist_store.save(&self.watchlist)?;
            self.record_analytics(AnalyticsEvent {
                timestamp: now_millis(),
                kind: AnalyticsKind::TrackPrice,
                product_name: result.product_name.clone(),
                category: result.category.as_str().to_string(),
                retailer: None,
            })?;
            true
        };

        self.journal(
            "tracking_toggled",
            json!({
                "product_name": result.product_name,
                "tracked": tracked,
                "watchlist_size": self.watchlist.len(),
            }),
        );
        Ok(tracked)
    }

    /// Resolves an outbound link on the current result and records the click.
    pub fn open_offer(&mut self, target: OfferTarget) -> Result<String, SessionError> {
        let result = self.state.result().ok_or(SessionError::NoResult)?;

        let (link, retailer) = match target {
            OfferTarget::BestBuy => {
                let link = result
                    .best_buy_link
                    .clone()
                    .filter(|link| !link.is_empty())
                    .or_else(|| result.recommended_source().map(|source| source.uri.clone()))
                    .filter(|link| !link.is_empty())
                    .ok_or(SessionError::NoSuchOffer(0))?;
                let retailer = result
                    .sources
                    .iter()
                    .find(|source| source.uri == link)
                    .map(|source| source.title.clone())
                    .unwrap_or_else(|| link_host(&link));
                (link, retailer)
            }
            OfferTarget::Source(index) => {
                let source = result
                    .sources
                    .get(index)
                    .filter(|source| !source.uri.is_empty())
                    .ok_or(SessionError::NoSuchOffer(index))?;
                (source.uri.clone(), source.title.clone())
            }
        };

        let event = AnalyticsEvent {
            timestamp: now_millis(),
            kind: AnalyticsKind::ClickBuy,
            product_name: result.product_name.clone(),
            category: result.category.as_str().to_string(),
            retailer: Some(retailer.clone()),
        };
        self.record_analytics(event)?;
        self.journal(
            "offer_opened",
            json!({
                "retailer": retailer,
                "link": link,
            }),
        );
        Ok(link)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Advances the "other retailers" listing. Clamped to the listing length.
    pub fn scroll_by(&mut self, rows: usize) -> usize {
        let limit = self
            .state
            .result()
            .map(|result| result.other_sources().len())
            .unwrap_or(0);
        self.scroll_offset = self.scroll_offset.saturating_add(rows).min(limit);
        self.scroll_offset
    }

    pub fn clear_watchlist(&mut self) -> Result<usize, SessionError> {
        let removed = self.watchlist.len();
        self.watchlist.clear();
        self.watchlist_store.save(&self.watchlist)?;
        Ok(removed)
    }

    fn tracked_position(&self, product_name: &str) -> Option<usize> {
        self.watchlist
            .iter()
            .position(|item| item.name == product_name)
    }

    fn record_analytics(&mut self, event: AnalyticsEvent) -> anyhow::Result<()> {
        debug!("analytics {} {:?}", event.kind.as_str(), event.product_name);
        push_analytics_event(&mut self.analytics, event);
        self.analytics_store.save(&self.analytics)
    }

    fn journal(&self, event_type: &str, payload: Value) {
        write_journal(&self.events, event_type, payload);
    }

    fn journal_analysis(&self, ticket: u64, event_type: &str, payload: Value) {
        write_journal(&self.events.for_ticket(ticket), event_type, payload);
    }
}

fn write_journal(events: &EventWriter, event_type: &str, payload: Value) {
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        warn!("failed to write {event_type} event: {err:#}");
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn link_host(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| link.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use price_guardian_contracts::events::EventWriter;
    use price_guardian_contracts::store::{JsonFileStore, MemoryStore};
    use price_guardian_contracts::{
        AnalysisResult, AnalyticsEvent, AnalyticsKind, Category, RetailerSource, TrackedItem,
        Verdict, ANALYTICS_LOG_CAP,
    };
    use serde_json::Value;

    use crate::analyzer::{AnalysisQuery, ProductAnalyzer};
    use crate::error::{AnalysisError, SessionError};

    use super::{OfferTarget, Session, ViewState};

    struct FixedAnalyzer(Result<AnalysisResult, AnalysisError>);

    impl ProductAnalyzer for FixedAnalyzer {
        fn analyze(&self, _query: &AnalysisQuery) -> Result<AnalysisResult, AnalysisError> {
            self.0.clone()
        }
    }

    fn source(title: &str, uri: &str) -> RetailerSource {
        RetailerSource {
            title: title.to_string(),
            uri: uri.to_string(),
            trust_score: 4,
            delivery_charge: "৳ 60".to_string(),
            delivery_time: "1-2 days".to_string(),
            offers: Vec::new(),
            branch_info: None,
            is_sponsored: false,
            is_featured: false,
        }
    }

    fn result(name: &str) -> AnalysisResult {
        AnalysisResult {
            product_name: name.to_string(),
            category: Category::Electronics,
            current_found_price: "৳ 52,000".to_string(),
            market_average: "৳ 55,000".to_string(),
            verdict: Verdict::BuyNow,
            advice: "এখনই কিনুন".to_string(),
            price_history: Vec::new(),
            sources: (0..8)
                .map(|idx| source(&format!("Shop {idx}"), &format!("https://shop{idx}.bd/p")))
                .collect(),
            best_buy_link: Some("https://www.bestshop.com.bd/p?aff_id=gp_2025".to_string()),
            product_image_url: Some("https://img.bd/x.jpg".to_string()),
            emi_options: None,
            bank_cashback: None,
        }
    }

    struct Fixture {
        session: Session,
        watchlist: MemoryStore<TrackedItem>,
        analytics: MemoryStore<AnalyticsEvent>,
    }

    fn fixture(analytics_seed: Vec<AnalyticsEvent>) -> anyhow::Result<Fixture> {
        let watchlist = MemoryStore::default();
        let analytics = MemoryStore::new(analytics_seed);
        let session = Session::new(
            Box::new(watchlist.clone()),
            Box::new(analytics.clone()),
            EventWriter::disabled("test-session"),
        )?;
        Ok(Fixture {
            session,
            watchlist,
            analytics,
        })
    }

    fn in_result(name: &str) -> anyhow::Result<Fixture> {
        let mut fx = fixture(Vec::new())?;
        fx.session
            .analyze(&FixedAnalyzer(Ok(result(name))), AnalysisQuery::from_text(name))?;
        Ok(fx)
    }

    #[test]
    fn successful_analysis_lands_in_result_and_logs_search() -> anyhow::Result<()> {
        let fx = in_result("Walton Fridge")?;
        assert_eq!(fx.session.state().name(), "RESULT");
        let events = fx.analytics.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnalyticsKind::Search);
        assert_eq!(events[0].product_name, "Walton Fridge");
        assert_eq!(events[0].category, "Electronics");
        Ok(())
    }

    #[test]
    fn failed_analysis_lands_in_error_without_analytics() -> anyhow::Result<()> {
        let mut fx = fixture(Vec::new())?;
        let state = fx.session.analyze(
            &FixedAnalyzer(Err(AnalysisError::InsufficientData)),
            AnalysisQuery::from_text("unknown gadget"),
        )?;
        assert_eq!(state, &ViewState::Error(AnalysisError::InsufficientData));
        assert!(fx.analytics.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn overlapping_submission_is_rejected() -> anyhow::Result<()> {
        let mut fx = fixture(Vec::new())?;
        let pending = fx.session.begin_analysis(AnalysisQuery::from_text("tv"))?;
        assert_eq!(fx.session.state(), &ViewState::Analyzing);
        assert!(matches!(
            fx.session.begin_analysis(AnalysisQuery::from_text("radio")),
            Err(SessionError::Busy)
        ));
        assert!(matches!(fx.session.reset(), Err(SessionError::Busy)));

        fx.session.finish_analysis(pending, Ok(result("TV")))?;
        assert!(matches!(
            fx.session.begin_analysis(AnalysisQuery::from_text("radio")),
            Err(SessionError::NotIdle)
        ));
        fx.session.reset()?;
        assert!(fx.session.begin_analysis(AnalysisQuery::from_text("radio")).is_ok());
        Ok(())
    }

    #[test]
    fn finished_ticket_cannot_be_replayed() -> anyhow::Result<()> {
        let mut fx = fixture(Vec::new())?;
        let pending = fx.session.begin_analysis(AnalysisQuery::from_text("tv"))?;
        let ticket = pending.ticket();
        fx.session.finish_analysis(pending, Ok(result("TV")))?;
        fx.session.reset()?;

        let _second = fx.session.begin_analysis(AnalysisQuery::from_text("tv"))?;
        let replay = super::PendingAnalysis {
            ticket,
            query: AnalysisQuery::from_text("tv"),
        };
        assert!(matches!(
            fx.session.finish_analysis(replay, Ok(result("TV"))),
            Err(SessionError::StalePending(t)) if t == ticket
        ));
        assert_eq!(fx.session.state(), &ViewState::Analyzing);
        Ok(())
    }

    #[test]
    fn empty_query_does_not_leave_idle() -> anyhow::Result<()> {
        let mut fx = fixture(Vec::new())?;
        assert!(matches!(
            fx.session.begin_analysis(AnalysisQuery::from_text("  ")),
            Err(SessionError::EmptyQuery)
        ));
        assert_eq!(fx.session.state(), &ViewState::Idle);
        Ok(())
    }

    #[test]
    fn toggle_removes_then_readds_with_new_identity() -> anyhow::Result<()> {
        let mut fx = in_result("Rice 5kg")?;
        assert!(fx.session.toggle_track()?);
        let first = fx.watchlist.snapshot();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Rice 5kg");
        assert_eq!(first[0].price, "৳ 52,000");
        assert_eq!(first[0].image, "https://img.bd/x.jpg");

        assert!(!fx.session.toggle_track()?);
        assert!(fx.watchlist.snapshot().is_empty());
        assert!(!fx.session.is_tracked());

        assert!(fx.session.toggle_track()?);
        let again = fx.watchlist.snapshot();
        assert_eq!(again.len(), 1);
        assert_ne!(again[0].id, first[0].id);
        assert!(again[0].added_at >= first[0].added_at);

        let kinds: Vec<AnalyticsKind> = fx.analytics.snapshot().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![AnalyticsKind::TrackPrice, AnalyticsKind::TrackPrice, AnalyticsKind::Search]
        );
        Ok(())
    }

    #[test]
    fn new_tracked_items_are_prepended() -> anyhow::Result<()> {
        let mut fx = in_result("First")?;
        fx.session.toggle_track()?;
        fx.session.reset()?;
        fx.session
            .analyze(&FixedAnalyzer(Ok(result("Second"))), AnalysisQuery::from_text("second"))?;
        fx.session.toggle_track()?;
        let names: Vec<String> = fx.session.watchlist().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["Second", "First"]);
        Ok(())
    }

    #[test]
    fn toggle_without_result_is_refused() -> anyhow::Result<()> {
        let mut fx = fixture(Vec::new())?;
        assert!(matches!(fx.session.toggle_track(), Err(SessionError::NoResult)));
        assert!(matches!(
            fx.session.open_offer(OfferTarget::BestBuy),
            Err(SessionError::NoResult)
        ));
        Ok(())
    }

    #[test]
    fn analytics_log_keeps_newest_hundred() -> anyhow::Result<()> {
        let seed: Vec<AnalyticsEvent> = (0..ANALYTICS_LOG_CAP as i64)
            .map(|idx| AnalyticsEvent {
                timestamp: idx,
                kind: AnalyticsKind::Search,
                product_name: format!("old-{idx}"),
                category: "Other".to_string(),
                retailer: None,
            })
            .collect();
        let mut fx = fixture(seed)?;
        fx.session
            .analyze(&FixedAnalyzer(Ok(result("Newest"))), AnalysisQuery::from_text("newest"))?;
        let events = fx.analytics.snapshot();
        assert_eq!(events.len(), ANALYTICS_LOG_CAP);
        assert_eq!(events[0].product_name, "Newest");
        assert_eq!(events[ANALYTICS_LOG_CAP - 1].product_name, "old-98");
        Ok(())
    }

    #[test]
    fn open_offer_records_click_with_retailer() -> anyhow::Result<()> {
        let mut fx = in_result("Laptop")?;
        let link = fx.session.open_offer(OfferTarget::Source(2))?;
        assert_eq!(link, "https://shop2.bd/p");
        let best = fx.session.open_offer(OfferTarget::BestBuy)?;
        assert_eq!(best, "https://www.bestshop.com.bd/p?aff_id=gp_2025");

        let events = fx.analytics.snapshot();
        assert_eq!(events[0].kind, AnalyticsKind::ClickBuy);
        assert_eq!(events[0].retailer.as_deref(), Some("bestshop.com.bd"));
        assert_eq!(events[1].retailer.as_deref(), Some("Shop 2"));

        assert!(matches!(
            fx.session.open_offer(OfferTarget::Source(42)),
            Err(SessionError::NoSuchOffer(42))
        ));
        Ok(())
    }

    #[test]
    fn scroll_clamps_and_resets_on_new_result() -> anyhow::Result<()> {
        let mut fx = in_result("Phone")?;
        assert_eq!(fx.session.scroll_offset(), 0);
        assert_eq!(fx.session.scroll_by(5), 5);
        assert_eq!(fx.session.scroll_by(5), 7);
        fx.session.reset()?;
        assert_eq!(fx.session.scroll_offset(), 0);
        fx.session
            .analyze(&FixedAnalyzer(Ok(result("Phone"))), AnalysisQuery::from_text("phone"))?;
        assert_eq!(fx.session.scroll_offset(), 0);
        Ok(())
    }

    #[test]
    fn file_stores_and_journal_persist_across_sessions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let open = |dir: &std::path::Path| -> anyhow::Result<Session> {
            Session::new(
                Box::new(JsonFileStore::<TrackedItem>::for_key(dir, "pg_v10_tracked")),
                Box::new(JsonFileStore::<AnalyticsEvent>::for_key(dir, "pg_v10_analytics")),
                EventWriter::new(events_path.clone(), "persist-test"),
            )
        };

        let mut first = open(temp.path())?;
        first.analyze(&FixedAnalyzer(Ok(result("Oil"))), AnalysisQuery::from_text("oil"))?;
        first.toggle_track()?;
        drop(first);

        let second = open(temp.path())?;
        assert_eq!(second.watchlist().len(), 1);
        assert_eq!(second.watchlist()[0].name, "Oil");
        assert_eq!(second.analytics().len(), 2);

        let raw = fs::read_to_string(&events_path)?;
        let rows: Vec<Value> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .collect();
        let types: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "analysis_started",
                "analysis_completed",
                "tracking_toggled",
                "session_started",
            ]
        );
        assert!(rows[0].get("ticket").is_none());
        assert_eq!(rows[1]["ticket"], Value::from(1u64));
        assert_eq!(rows[2]["ticket"], Value::from(1u64));
        assert!(rows[3].get("ticket").is_none());
        Ok(())
    }
}
