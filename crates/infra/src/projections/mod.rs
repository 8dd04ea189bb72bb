//! Read-only projections over the ledger view.

pub mod dashboard;

pub use dashboard::{CavaStock, DashboardReport, ExpiringEntry, IncidentSummary, StockTotals};
