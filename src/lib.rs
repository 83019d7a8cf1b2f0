//! ALCHEMY-ARB — cross-city tier-conversion arbitrage for alchemy ingredients
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod catalog;
pub mod cache;
pub mod storage;
pub mod publisher;
pub mod market;
pub mod engine;
pub mod dashboard;
