//! HTTP API over the cava inventory ledger.

pub mod app;
