use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cavastock_core::{DomainError, DomainResult, Entity};

/// Catalog entry, identified by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
}

impl Product {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl Entity for Product {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

/// Products known to the facility, keyed by code.
///
/// Codes are trimmed on the way in and on lookup; matching is otherwise exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductCatalog {
    products: BTreeMap<String, Product>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the facility's standing product list.
    pub fn seeded() -> Self {
        let mut catalog = Self::new();
        for (code, name) in [
            ("1001", "LOMO DE RES"),
            ("1002", "PUNTA TRASERA"),
            ("1003", "SOLOMO DE CUERITO"),
            ("1004", "PULPA NEGRA"),
            ("2001", "CARNE MOLIDA"),
            ("2002", "CHULETA AHUMADA"),
            ("3001", "PECHUGA DE POLLO"),
        ] {
            catalog
                .products
                .insert(code.to_string(), Product::new(code, name));
        }
        catalog
    }

    /// Build a catalog from an arbitrary list, rejecting duplicates.
    pub fn from_products(products: impl IntoIterator<Item = Product>) -> DomainResult<Self> {
        let mut catalog = Self::new();
        for p in products {
            catalog.register(p)?;
        }
        Ok(catalog)
    }

    /// Add a product. Codes are unique; names cannot be blank.
    pub fn register(&mut self, product: Product) -> DomainResult<&Product> {
        let code = product.code.trim().to_string();
        let name = product.name.trim().to_string();

        if code.is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if self.products.contains_key(&code) {
            return Err(DomainError::validation(format!(
                "product code {code} is already registered"
            )));
        }

        Ok(self
            .products
            .entry(code.clone())
            .or_insert(Product { code, name }))
    }

    /// Insert or replace a product that was already validated by `register`.
    ///
    /// Returns the product previously stored under the same code.
    pub fn upsert(&mut self, product: Product) -> Option<Product> {
        let code = product.code.trim().to_string();
        let name = product.name.trim().to_string();
        self.products.insert(code.clone(), Product { code, name })
    }

    pub fn get(&self, code: &str) -> Option<&Product> {
        self.products.get(code.trim())
    }

    /// Resolve a code or fail with a validation error (unknown product code).
    pub fn resolve(&self, code: &str) -> DomainResult<&Product> {
        self.get(code)
            .ok_or_else(|| DomainError::validation(format!("unknown product code: {}", code.trim())))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Products ordered by code.
    pub fn list(&self) -> Vec<Product> {
        self.products.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_trims_and_resolves() {
        let mut catalog = ProductCatalog::new();
        catalog.register(Product::new(" 500 ", " COSTILLA ")).unwrap();

        let p = catalog.resolve("500").unwrap();
        assert_eq!(p.code, "500");
        assert_eq!(p.name, "COSTILLA");
        assert!(catalog.contains(" 500"));
    }

    #[test]
    fn register_rejects_duplicate_code() {
        let mut catalog = ProductCatalog::seeded();
        let before = catalog.len();

        let err = catalog.register(Product::new("1001", "OTRO")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(catalog.len(), before);
    }

    #[test]
    fn register_rejects_blank_fields() {
        let mut catalog = ProductCatalog::new();
        assert!(catalog.register(Product::new("  ", "X")).is_err());
        assert!(catalog.register(Product::new("9", "   ")).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut catalog = ProductCatalog::new();
        assert!(catalog.upsert(Product::new(" 500 ", "COSTILLA")).is_none());
        let previous = catalog.upsert(Product::new("500", "COSTILLA")).unwrap();

        assert_eq!(previous, Product::new("500", "COSTILLA"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.resolve("500").unwrap().name, "COSTILLA");
    }

    #[test]
    fn resolve_unknown_code_is_validation_error() {
        let catalog = ProductCatalog::seeded();
        match catalog.resolve("nope") {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("nope")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn from_products_rejects_duplicates() {
        let err = ProductCatalog::from_products([
            Product::new("1", "A"),
            Product::new("1", "B"),
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn list_is_ordered_by_code() {
        let catalog = ProductCatalog::from_products([
            Product::new("30", "C"),
            Product::new("10", "A"),
            Product::new("20", "B"),
        ])
        .unwrap();
        let codes: Vec<_> = catalog.list().into_iter().map(|p| p.code).collect();
        assert_eq!(codes, vec!["10", "20", "30"]);
    }

    #[test]
    fn product_serializes_with_plain_field_names() {
        let json = serde_json::to_value(Product::new("1", "LOMO")).unwrap();
        assert_eq!(json, serde_json::json!({"code": "1", "name": "LOMO"}));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any registered code resolves back to its product.
            #[test]
            fn registered_codes_resolve(code in "[A-Z0-9]{1,12}", name in "[A-Z][A-Z ]{0,30}") {
                let mut catalog = ProductCatalog::new();
                catalog.register(Product::new(code.clone(), name.clone())).unwrap();
                let p = catalog.resolve(&code).unwrap();
                prop_assert_eq!(&p.code, &code);
                prop_assert_eq!(&p.name, name.trim());
            }
        }
    }
}
