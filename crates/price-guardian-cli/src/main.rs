mod render;

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use price_guardian_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use price_guardian_contracts::events::EventWriter;
use price_guardian_contracts::store::{analytics_store, watchlist_store, MemoryStore};
use price_guardian_engine::{
    capture_image, now_millis, resolve_location, AnalysisQuery, DryrunModel, FixedLocation,
    GeminiClient, GenerativeModel, GeoPoint, GuardianConfig, OfferTarget, PriceGuardian,
    Session, SessionError, ViewState,
};
use serde_json::{json, Value};

use crate::render::{
    other_sources_lines, render_analytics, render_error, render_result, render_watchlist,
    OTHER_SOURCES_PAGE,
};

const EXIT_OK: i32 = 0;
const EXIT_NO_DATA: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "price-guardian",
    version,
    about = "Live best-price checks across Bangladeshi retailers"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args, Default)]
struct GlobalArgs {
    /// Answer from a canned payload; nothing is sent or persisted.
    #[arg(long, global = true)]
    dryrun: bool,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// "lat,lon"
    #[arg(long, global = true)]
    location: Option<String>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    Search(SearchArgs),
    Scan(ScanArgs),
    Chat,
    Watchlist(WatchlistArgs),
    Analytics(AnalyticsArgs),
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Product name or retailer link.
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    image: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct WatchlistArgs {
    #[arg(long)]
    clear: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct AnalyticsArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("PRICE_GUARDIAN_LOG", "warn"))
        .init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("price-guardian error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = resolve_config(GuardianConfig::from_env()?, &cli.global)?;
    let mut app = App::open(config, &cli.global)?;
    match cli.command {
        Command::Search(args) => {
            let query = AnalysisQuery::from_text(args.text.join(" "));
            app.analyze_once(query, args.json)
        }
        Command::Scan(args) => {
            let image = capture_image(&args.image, app.config.max_image_dim)?;
            app.analyze_once(AnalysisQuery::from_image(image), args.json)
        }
        Command::Chat => {
            app.chat()?;
            Ok(EXIT_OK)
        }
        Command::Watchlist(args) => {
            if args.clear {
                let removed = app.session.clear_watchlist()?;
                println!("Removed {removed} tracked item(s).");
            } else if args.json {
                println!("{}", serde_json::to_string_pretty(app.session.watchlist())?);
            } else {
                println!("{}", render_watchlist(app.session.watchlist()));
            }
            Ok(EXIT_OK)
        }
        Command::Analytics(args) => {
            let events = app.session.analytics();
            if args.json {
                let shown = &events[..args.limit.min(events.len())];
                println!("{}", serde_json::to_string_pretty(shown)?);
            } else {
                println!("{}", render_analytics(events, args.limit));
            }
            Ok(EXIT_OK)
        }
    }
}

/// Flags win over the environment.
fn resolve_config(mut config: GuardianConfig, global: &GlobalArgs) -> Result<GuardianConfig> {
    if let Some(model) = global.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.model = model.to_string();
    }
    if let Some(dir) = global.data_dir.clone() {
        config.data_dir = dir;
    }
    if let Some(raw) = global.location.as_deref() {
        let point = raw
            .parse::<GeoPoint>()
            .with_context(|| format!("--location {raw:?} is not \"lat,lon\""))?;
        config.location = Some(point);
    }
    Ok(config)
}

struct App {
    config: GuardianConfig,
    guardian: PriceGuardian,
    session: Session,
    location: Option<GeoPoint>,
}

impl App {
    fn open(config: GuardianConfig, global: &GlobalArgs) -> Result<Self> {
        let session_id = format!("pg-{}", now_millis());
        let (model, session): (Box<dyn GenerativeModel>, Session) = if global.dryrun {
            let events = match global.events.clone() {
                Some(path) => EventWriter::new(path, session_id),
                None => EventWriter::disabled(session_id),
            };
            let session = Session::new(
                Box::new(MemoryStore::default()),
                Box::new(MemoryStore::default()),
                events,
            )?;
            (Box::new(DryrunModel::new()), session)
        } else {
            let events_path = global
                .events
                .clone()
                .unwrap_or_else(|| config.events_path());
            let session = Session::new(
                Box::new(watchlist_store(&config.data_dir)),
                Box::new(analytics_store(&config.data_dir)),
                EventWriter::new(events_path, session_id),
            )?;
            (Box::new(GeminiClient::from_config(&config)?), session)
        };

        let location = resolve_location(FixedLocation(config.location), config.location_timeout);
        match location {
            Some(point) => info!("location resolved: {point}"),
            None => info!("location unknown"),
        }
        let guardian = PriceGuardian::new(model, config.model.clone());
        Ok(Self {
            config,
            guardian,
            session,
            location,
        })
    }

    fn analyze_once(&mut self, query: AnalysisQuery, as_json: bool) -> Result<i32> {
        let query = query.with_location(self.location);
        let state = self.session.analyze(&self.guardian, query)?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&state_json(state))?);
        } else {
            println!("{}", render_state(state, 0));
        }
        Ok(exit_code(state))
    }

    fn chat(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut line = String::new();
        println!(
            "Price Guardian ({} via {}). Type a product, paste a link, or /help.",
            self.guardian.model_name(),
            self.guardian.provider()
        );

        loop {
            print!("> ");
            io::stdout().flush()?;

            line.clear();
            let read = match stdin.read_line(&mut line) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                break;
            }

            let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
            match intent.action.as_str() {
                "noop" => continue,
                "quit" => break,
                "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
                "search" => {
                    let query = AnalysisQuery::from_text(intent.query.unwrap_or_default());
                    self.chat_analyze(query)?;
                }
                "scan" => {
                    let Some(path) = value_as_non_empty_string(intent.command_args.get("path"))
                    else {
                        println!("/scan requires a path");
                        continue;
                    };
                    match capture_image(Path::new(&path), self.config.max_image_dim) {
                        Ok(image) => self.chat_analyze(AnalysisQuery::from_image(image))?,
                        Err(err) => println!("Scan failed: {err:#}"),
                    }
                }
                "toggle_track" => match self.session.toggle_track() {
                    Ok(true) => println!("Tracking price. /watchlist to review."),
                    Ok(false) => println!("Removed from watchlist."),
                    Err(err) => report_session_error(err)?,
                },
                "open_offer" => {
                    let target = offer_target(intent.command_args.get("index"));
                    match self.session.open_offer(target) {
                        Ok(link) => println!("Open: {link}"),
                        Err(err) => report_session_error(err)?,
                    }
                }
                "scroll" => {
                    let offset = self.session.scroll_by(OTHER_SOURCES_PAGE);
                    match self.session.state().result() {
                        Some(result) => {
                            for row in other_sources_lines(result, offset) {
                                println!("{row}");
                            }
                        }
                        None => println!("Nothing to scroll."),
                    }
                }
                "show_watchlist" => println!("{}", render_watchlist(self.session.watchlist())),
                "show_analytics" => println!("{}", render_analytics(self.session.analytics(), 20)),
                "reset" => match self.session.reset() {
                    Ok(()) => println!("Ready for a new search."),
                    Err(err) => report_session_error(err)?,
                },
                _ => {
                    let command = value_as_non_empty_string(intent.command_args.get("command"))
                        .unwrap_or_else(|| intent.raw.trim().to_string());
                    println!("Unknown command: /{command}. Type /help.");
                }
            }
        }
        Ok(())
    }

    fn chat_analyze(&mut self, query: AnalysisQuery) -> Result<()> {
        println!("Checking live prices...");
        let query = query.with_location(self.location);
        match self.session.analyze(&self.guardian, query) {
            Ok(state) => println!("{}", render_state(state, 0)),
            Err(err) => report_session_error(err)?,
        }
        Ok(())
    }
}

/// Transition refusals are shown to the user; store failures abort the shell.
fn report_session_error(err: SessionError) -> Result<()> {
    match err {
        SessionError::Store(inner) => Err(inner),
        SessionError::NotIdle => {
            println!("{err}. Type /new first.");
            Ok(())
        }
        other => {
            warn!("session refused: {other}");
            println!("{other}.");
            Ok(())
        }
    }
}

/// `/buy` opens the best-buy link; `/buy n` opens the n-th listed store.
fn offer_target(index: Option<&Value>) -> OfferTarget {
    match index.and_then(Value::as_u64) {
        Some(n) if n >= 1 => OfferTarget::Source((n - 1) as usize),
        _ => OfferTarget::BestBuy,
    }
}

fn render_state(state: &ViewState, scroll_offset: usize) -> String {
    match state {
        ViewState::Result(result) => render_result(result, scroll_offset),
        ViewState::Error(err) => render_error(err),
        ViewState::Idle | ViewState::Analyzing => state.name().to_string(),
    }
}

fn state_json(state: &ViewState) -> Value {
    match state {
        ViewState::Result(result) => serde_json::to_value(result).unwrap_or(Value::Null),
        ViewState::Error(err) => json!({
            "error": err.kind(),
            "message": err.user_message(),
            "detail": err.to_string(),
        }),
        ViewState::Idle | ViewState::Analyzing => json!({ "state": state.name() }),
    }
}

fn exit_code(state: &ViewState) -> i32 {
    match state {
        ViewState::Error(_) => EXIT_NO_DATA,
        _ => EXIT_OK,
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
