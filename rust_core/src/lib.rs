//! Courtedge core - consensus lines vs exchange pricing.
//!
//! This library reconciles sportsbook consensus lines (moneyline, spread,
//! total) for a day's games against a prediction-market exchange's
//! per-contract listings and computes fee-adjusted expected value for taker
//! and maker execution. It provides:
//! - Multi-tier ticker/title parsing into normalized strike records
//! - Canonical-perspective selection (one reporting side per game/market)
//! - Pricing over bid-only order books (asks always derived)
//! - Taker/maker fee schedules, break-evens and EV
//! - A staged fetch orchestrator owning every network call, with tiered
//!   snapshot / manifest / order-book caching
//! - Row builders running the three market pipelines on a worker pool
//!
//! Process entry points, credentials and rendering are the embedding
//! application's concern.

mod types;

pub mod cache;
pub mod clients;
pub mod config;
pub mod consensus;
pub mod error;
pub mod ev;
pub mod matching;
pub mod models;
pub mod orchestrator;
pub mod parsing;
pub mod pricing;
pub mod rows;
pub mod selection;

pub use config::ScanConfig;
pub use error::ScanError;
pub use models::{ContractSide, MarketKind};
pub use orchestrator::{FetchCaches, FetchOrchestrator, ScanContext};
pub use rows::{run_pipelines, ScanReport};
pub use types::*;

use chrono::NaiveDate;
use std::sync::Arc;

/// Run one full scan: stage the orchestrator through every fetch phase,
/// then build all rows. `slate_date` defaults to today in the configured
/// slate timezone.
pub async fn run_scan(
    orchestrator: FetchOrchestrator,
    slate_date: Option<NaiveDate>,
) -> Result<ScanReport, ScanError> {
    let ctx = orchestrator
        .load_snapshot()
        .await?
        .resolve_games(slate_date)?
        .resolve_markets()
        .await?
        .prefetch_orderbooks()
        .await?;
    Ok(run_pipelines(Arc::new(ctx)).await)
}
