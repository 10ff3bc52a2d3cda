//! Scan Screener Library
//!
//! Intraday A-share screening: poll a realtime quote provider in batches,
//! run each quote through a named filter profile, score and rank the
//! survivors, persist the result and push it to output sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     scan-screener (CLI + scheduler)                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Market Data    │  │  Screener       │  │  Sinks          │     │
//! │  │  Fetcher        │  │  Engine         │  │  console/file/  │     │
//! │  │                 │  │                 │  │  webhook/email  │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## VWAP deviation
//! - Volume arrives in lots, amount in yuan: `vwap = amount / (volume * 100)`
//! - Tail-market profiles want price slightly above VWAP, not far above it
//!
//! ## Estimated capitalization
//! - `amount / (turnover% / 100)` stands in for circulating market cap
//! - The cap tier selects the turnover band for tiered profiles
//!
//! ## Scheduling
//! - Cron slots map clock times to profiles
//! - Each slot runs at most once per day as a child `screen` process

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod history;
pub mod scheduler;
pub mod screener;
pub mod sinks;
