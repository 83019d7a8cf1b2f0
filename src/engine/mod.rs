//! Core engine: ingestion, the periodic opportunity scan, on-demand
//! simulation, the read-side queries and the timers that drive them.

pub mod ingestor;
pub mod pricing;
pub mod queries;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod simulator;

pub use ingestor::MarketIngestor;
pub use queries::OpportunityQueries;
pub use resolver::{CachedResolver, QuoteResolver};
pub use scanner::OpportunityEngine;
pub use scheduler::Scheduler;
