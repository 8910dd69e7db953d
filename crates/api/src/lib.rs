//! HTTP API for the stock ledger: configuration, identity, routing.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
