use chrono::DateTime;
use price_guardian_contracts::{
    AnalysisResult, AnalyticsEvent, PricePoint, RetailerSource, TrackedItem, Verdict,
};
use price_guardian_engine::AnalysisError;

pub const OTHER_SOURCES_PAGE: usize = 5;
const CHART_WIDTH: usize = 30;

pub fn verdict_banner(verdict: Verdict) -> String {
    let marker = match verdict {
        Verdict::BuyNow => "[+]",
        Verdict::Wait => "[~]",
        Verdict::Caution => "[!]",
    };
    format!("{marker} {}", verdict.label())
}

pub fn trust_stars(score: u8) -> String {
    let filled = usize::from(score.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

/// Horizontal bars scaled to the highest price in the series.
pub fn price_chart(points: &[PricePoint]) -> Vec<String> {
    let max = points
        .iter()
        .map(|point| point.price)
        .fold(0.0_f64, f64::max);
    if points.is_empty() || max <= 0.0 {
        return Vec::new();
    }
    let label_width = points
        .iter()
        .map(|point| point.month.chars().count())
        .max()
        .unwrap_or(0);
    points
        .iter()
        .map(|point| {
            let ratio = (point.price.max(0.0) / max).min(1.0);
            let mut len = (ratio * CHART_WIDTH as f64).round() as usize;
            if point.price > 0.0 {
                len = len.max(1);
            }
            format!(
                "  {:<label_width$} {:<bar_width$} ৳{:.0}",
                point.month,
                "█".repeat(len),
                point.price,
                bar_width = CHART_WIDTH
            )
        })
        .collect()
}

fn source_line(source: &RetailerSource) -> String {
    let mut line = format!("{} {}", trust_stars(source.trust_score), source.title);
    if !source.delivery_charge.is_empty() || !source.delivery_time.is_empty() {
        line.push_str(&format!(
            "  (delivery {} / {})",
            non_empty_or(&source.delivery_charge, "?"),
            non_empty_or(&source.delivery_time, "?")
        ));
    }
    if source.is_sponsored {
        line.push_str("  [sponsored]");
    }
    line
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

pub fn render_result(result: &AnalysisResult, scroll_offset: usize) -> String {
    let mut lines = vec![
        verdict_banner(result.verdict),
        format!("{} ({})", result.product_name, result.category),
        format!(
            "Lowest price: {}   Market average: {}",
            result.current_found_price, result.market_average
        ),
        String::new(),
        result.advice.clone(),
    ];
    if let Some(emi) = result.emi_options.as_deref() {
        lines.push(format!("EMI: {emi}"));
    }
    if let Some(cashback) = result.bank_cashback.as_deref() {
        lines.push(format!("Cashback: {cashback}"));
    }

    let chart = price_chart(&result.price_history);
    if !chart.is_empty() {
        lines.push(String::new());
        lines.push("Price history".to_string());
        lines.extend(chart);
    }

    if let Some(best) = result.recommended_source() {
        lines.push(String::new());
        lines.push("Recommended store".to_string());
        lines.push(format!("  1. {}", source_line(best)));
        if let Some(branch) = best.branch_info.as_deref() {
            lines.push(format!("     {branch}"));
        }
        for offer in &best.offers {
            lines.push(format!("     * {offer}"));
        }
        lines.push(format!("     {}", best.uri));
    }
    if let Some(link) = result.best_buy_link.as_deref() {
        lines.push(format!("Best buy: {link}"));
    }

    lines.extend(other_sources_lines(result, scroll_offset));
    lines.join("\n")
}

/// The first `OTHER_SOURCES_PAGE + scroll_offset` entries after the recommended store.
pub fn other_sources_lines(result: &AnalysisResult, scroll_offset: usize) -> Vec<String> {
    let others = result.other_sources();
    if others.is_empty() {
        return Vec::new();
    }
    let visible = (OTHER_SOURCES_PAGE + scroll_offset).min(others.len());
    let mut lines = vec![String::new(), "Other retailers".to_string()];
    for (idx, source) in others.iter().take(visible).enumerate() {
        lines.push(format!("  {}. {}", idx + 2, source_line(source)));
    }
    let hidden = others.len() - visible;
    if hidden > 0 {
        lines.push(format!("  … {hidden} more (/more)"));
    }
    lines
}

pub fn render_error(err: &AnalysisError) -> String {
    format!("{}\nStart over with /new.", err.user_message())
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

pub fn render_watchlist(items: &[TrackedItem]) -> String {
    if items.is_empty() {
        return "Watchlist is empty.".to_string();
    }
    items
        .iter()
        .map(|item| {
            format!(
                "{}  {}  {}",
                format_millis(item.added_at),
                item.price,
                item.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_analytics(events: &[AnalyticsEvent], limit: usize) -> String {
    if events.is_empty() {
        return "No activity yet.".to_string();
    }
    events
        .iter()
        .take(limit)
        .map(|event| {
            let mut line = format!(
                "{}  {:<11} {} [{}]",
                format_millis(event.timestamp),
                event.kind.as_str(),
                event.product_name,
                event.category
            );
            if let Some(retailer) = event.retailer.as_deref() {
                line.push_str(&format!(" via {retailer}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
