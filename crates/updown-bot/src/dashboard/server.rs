//! The dashboard HTTP API (axum).
//!
//! Every handler copies the shared `BotState` snapshot under its lock and
//! releases it immediately; the aggregate endpoints read the order-history
//! file instead of touching live state.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;

use updown_common::{BotState, Market, OrderRecord};

use crate::config::Config;
use crate::supervisor::persist::load_history_file;
use crate::supervisor::SharedBotState;

use super::stats;

/// Everything the handlers need, shared across requests.
pub struct DashboardContext {
    state: SharedBotState,
    wallet_address: String,
    check_interval_seconds: u64,
    min_balance_needed: Decimal,
    history_path: PathBuf,
    log_path: PathBuf,
}

impl DashboardContext {
    pub fn new(cfg: &Config, state: SharedBotState, wallet_address: String) -> Self {
        Self {
            state,
            wallet_address,
            check_interval_seconds: cfg.check_interval_seconds,
            min_balance_needed: cfg.min_balance_needed(),
            history_path: PathBuf::from("order_history.json"),
            log_path: PathBuf::from(&cfg.log_file),
        }
    }

    fn snapshot(&self) -> BotState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Build the dashboard router.
pub fn router(context: Arc<DashboardContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/markets", get(markets))
        .route("/api/orders", get(orders))
        .route("/api/market-history", get(market_history))
        .route("/api/statistics", get(statistics))
        .route("/api/strategy-statistics", get(strategy_statistics))
        .route("/api/logs", get(logs))
        .with_state(context)
}

/// Serve the dashboard until an interrupt arrives.
pub async fn serve(
    cfg: &Config,
    state: SharedBotState,
    wallet_address: String,
) -> std::io::Result<()> {
    let context = Arc::new(DashboardContext::new(cfg, state, wallet_address));
    let app = router(context);
    let addr = format!("{}:{}", cfg.dashboard_host, cfg.dashboard_port);
    info!(addr, "Starting dashboard");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

async fn index() -> Json<Value> {
    Json(json!({ "service": "updown-bot dashboard", "endpoints": [
        "/api/status", "/api/markets", "/api/orders", "/api/market-history",
        "/api/statistics", "/api/strategy-statistics", "/api/logs",
    ]}))
}

async fn status(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let snapshot = ctx.snapshot();
    let last_check = snapshot.last_check.unwrap_or_else(Utc::now);
    let next_check = last_check + chrono::Duration::seconds(ctx.check_interval_seconds as i64);
    let balance_ok = snapshot.usdc_balance >= ctx.min_balance_needed;

    Json(json!({
        "is_running": snapshot.is_running,
        "last_check": last_check.to_rfc3339(),
        "next_check": next_check.to_rfc3339(),
        "check_interval_seconds": ctx.check_interval_seconds,
        "usdc_balance": snapshot.usdc_balance.round_dp(2),
        "total_pnl": snapshot.total_pnl.round_dp(2),
        "error_count": snapshot.error_count,
        "last_error": snapshot.last_error,
        "active_markets_count": snapshot.active_markets.len(),
        "pending_orders_count": snapshot.pending_orders.len(),
        "wallet_address": ctx.wallet_address,
        "balance_warning": !balance_ok,
        "balance_error_count": 0,
        "min_balance_needed": ctx.min_balance_needed,
    }))
}

async fn markets(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let snapshot = ctx.snapshot();
    let now = Utc::now();

    let mut markets = snapshot.active_markets;
    markets.sort_by_key(|m| m.start_ts);
    markets.truncate(10);

    let rows: Vec<Value> = markets.iter().map(|m| market_row(m, &now)).collect();
    Json(json!({ "markets": rows }))
}

fn market_row(market: &Market, now: &chrono::DateTime<Utc>) -> Value {
    let seconds_until_start = market.seconds_until_start(*now);
    let outcomes: Vec<Value> = market
        .outcomes
        .iter()
        .map(|o| {
            json!({
                "outcome": o.outcome,
                "price": o.price.map(|p| p.round_dp(3)),
                "best_bid": o.best_bid.map(|p| p.round_dp(3)),
                "best_ask": o.best_ask.map(|p| p.round_dp(3)),
            })
        })
        .collect();
    json!({
        "market_slug": market.market_slug,
        "question": market.question,
        "start_timestamp": market.start_ts,
        "start_datetime": market.start_time().to_rfc3339(),
        "end_datetime": market.end_time().to_rfc3339(),
        "time_until_start": seconds_until_start,
        "time_until_start_formatted": format_time_delta(seconds_until_start),
        "is_active": market.is_active,
        "is_resolved": market.is_resolved,
        "outcomes": outcomes,
    })
}

async fn orders(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let snapshot = ctx.snapshot();
    let pending: Vec<Value> = snapshot.pending_orders.iter().map(order_row).collect();
    let recent: Vec<Value> = snapshot.recent_orders.iter().take(100).map(order_row).collect();
    Json(json!({ "pending_orders": pending, "recent_orders": recent }))
}

fn order_row(order: &OrderRecord) -> Value {
    json!({
        "order_id": shorten(&order.order_id),
        "market_slug": order.market_slug,
        "outcome": order.outcome,
        "side": order.side,
        "price": order.price.round_dp(3),
        "size": order.size.round_dp(2),
        "size_usd": order.size_usd.round_dp(2),
        "status": order.status,
        "strategy": order.strategy,
        "created_at": order.created_at.to_rfc3339(),
        "filled_at": order.filled_at.map(|t| t.to_rfc3339()),
        "error_message": order.error_message,
    })
}

async fn market_history(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let history = load_history_file(&ctx.history_path);
    Json(json!({ "markets": stats::market_history_rows(&history) }))
}

async fn statistics(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let history = load_history_file(&ctx.history_path);
    Json(serde_json::to_value(stats::overall_stats(&history)).unwrap_or_default())
}

async fn strategy_statistics(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let history = load_history_file(&ctx.history_path);
    Json(json!({ "strategies": stats::strategy_stats(&history) }))
}

async fn logs(State(ctx): State<Arc<DashboardContext>>) -> Json<Value> {
    let lines: Vec<String> = std::fs::read_to_string(&ctx.log_path)
        .map(|content| {
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(50);
            all[start..].iter().map(|s| s.to_string()).collect()
        })
        .unwrap_or_default();
    Json(json!({ "logs": lines }))
}

fn shorten(id: &str) -> String {
    match id.get(..16) {
        Some(prefix) if id.len() > 16 => format!("{prefix}..."),
        _ => id.to_string(),
    }
}

fn format_time_delta(seconds: i64) -> String {
    if seconds < 0 {
        return "Started".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3_600 {
        return format!("{}m {}s", seconds / 60, seconds % 60);
    }
    format!("{}h {}m", seconds / 3_600, (seconds % 3_600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_ids() {
        assert_eq!(shorten("short"), "short");
        assert_eq!(shorten("0123456789abcdef"), "0123456789abcdef");
        assert_eq!(shorten("0123456789abcdefXYZ"), "0123456789abcdef...");
    }

    #[test]
    fn test_format_time_delta() {
        assert_eq!(format_time_delta(-5), "Started");
        assert_eq!(format_time_delta(42), "42s");
        assert_eq!(format_time_delta(720), "12m 0s");
        assert_eq!(format_time_delta(5_400), "1h 30m");
    }
}
