//! Product catalog: the static list of product codes the ledger accepts.

pub mod catalog;

pub use catalog::{Product, ProductCatalog};
