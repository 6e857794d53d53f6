// twsbatch/src/lib.rs
// Main entry point for the batch-fetch library

//! # twsbatch
//!
//! A batch fetch and request correlation layer for callback-driven broker
//! gateways, providing:
//!
//! - Thread-safe request-id allocation and symbol correlation
//! - Typed FIFO queues between the gateway's event thread and callers
//! - Chunked, rate-limit-aware batch fetching with pacing-violation retry
//! - Timeout-bounded blocking waits that detect disconnects and
//!   callback-thread death
//! - A parser for coded financial-statement documents
//!
//! Partial failure is the norm at scale: every batch returns both the data
//! obtained and an enumerated map of problem symbols with reasons, instead
//! of failing a whole run for a handful of bad tickers.

pub mod base;
pub mod batch;
pub mod client;
pub mod contract;
pub mod data;
pub mod fin_statements;
pub mod gateway;
pub mod mock;
pub mod pacing;
pub mod queues;
pub mod registry;
pub mod sink;
pub mod wait;

pub use base::{GatewayError, RequestKind};
pub use batch::{BatchFetcher, FetchConfig};
pub use client::BatchClient;
pub use data::{ErrorCategory, ErrorRecord, FetchOutcome, ResultRecord};
pub use fin_statements::{parse_financial_statements, FinancialPeriod, PeriodMode, StatementField};
pub use wait::{block_on, block_on_every};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
