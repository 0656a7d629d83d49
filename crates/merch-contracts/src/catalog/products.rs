use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{StudioError, StudioResult};
use crate::storage::{read_json_array, with_file_lock, write_json_atomic};

pub const PRODUCTS_FILE: &str = "merch_products.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A submitted product admin form.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductAction {
    Add(ProductRecord),
    UpdatePrice { id: String, price: f64 },
}

impl ProductAction {
    pub fn from_form(form: &HashMap<String, String>) -> StudioResult<Self> {
        let field = |name: &str| {
            form.get(name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let id = field("id");
        if id.is_empty() {
            return Err(StudioError::validation("Product id is required."));
        }
        let price = parse_price(&field("price"))?;
        match field("action").as_str() {
            "add" | "" => {
                let name = field("name");
                if name.is_empty() {
                    return Err(StudioError::validation("Product name is required."));
                }
                Ok(Self::Add(ProductRecord {
                    id,
                    name,
                    price,
                    extra: Map::new(),
                }))
            }
            "update" => Ok(Self::UpdatePrice { id, price }),
            other => Err(StudioError::validation(format!(
                "Unknown product action '{other}'."
            ))),
        }
    }
}

/// Positive, finite decimal prices only.
pub fn parse_price(raw: &str) -> StudioResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| StudioError::validation("Price must be a positive number."))
}

/// `merch_products.json`.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    path: PathBuf,
}

impl ProductCatalog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PRODUCTS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> StudioResult<Vec<ProductRecord>> {
        read_json_array(&self.path)
            .map_err(|err| StudioError::storage("Failed to read products", &err))
    }

    /// Adds a new product or reprices an existing one; returns the stored row.
    /// A rejected action leaves the file untouched.
    pub fn apply(&self, action: ProductAction) -> StudioResult<ProductRecord> {
        with_file_lock(&self.path, || {
            let mut products: Vec<ProductRecord> = read_json_array(&self.path)?;
            let stored = match action {
                ProductAction::Add(product) => {
                    if products.iter().any(|existing| existing.id == product.id) {
                        return Ok(Err(StudioError::validation(format!(
                            "A product with id '{}' already exists.",
                            product.id
                        ))));
                    }
                    products.push(product.clone());
                    product
                }
                ProductAction::UpdatePrice { id, price } => {
                    let Some(existing) = products.iter_mut().find(|existing| existing.id == id)
                    else {
                        return Ok(Err(StudioError::validation(format!(
                            "No product with id '{id}'."
                        ))));
                    };
                    existing.price = price;
                    existing.clone()
                }
            };
            write_json_atomic(&self.path, &products)?;
            Ok(Ok(stored))
        })
        .map_err(|err| StudioError::storage("Failed to save products", &err))?
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::Map;

    use super::{parse_price, ProductAction, ProductCatalog, ProductRecord};

    fn product(id: &str, price: f64) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            name: format!("{id} tee"),
            price,
            extra: Map::new(),
        }
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn new_unique_product_is_appended_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let catalog = ProductCatalog::new(temp.path());
        catalog.apply(ProductAction::Add(product("tee-black", 24.5)))?;
        catalog.apply(ProductAction::Add(product("hoodie", 49.0)))?;

        let ids: Vec<String> = catalog.list()?.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["tee-black", "hoodie"]);
        Ok(())
    }

    #[test]
    fn duplicate_id_is_rejected_and_store_unchanged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let catalog = ProductCatalog::new(temp.path());
        catalog.apply(ProductAction::Add(product("tee-black", 24.5)))?;
        let before = std::fs::read_to_string(catalog.path())?;

        let err = catalog
            .apply(ProductAction::Add(product("tee-black", 30.0)))
            .err();
        assert_eq!(err.map(|err| err.kind()), Some("validation"));
        assert_eq!(std::fs::read_to_string(catalog.path())?, before);
        Ok(())
    }

    #[test]
    fn id_match_is_case_sensitive() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let catalog = ProductCatalog::new(temp.path());
        catalog.apply(ProductAction::Add(product("Mug", 12.0)))?;
        catalog.apply(ProductAction::Add(product("mug", 12.0)))?;
        assert_eq!(catalog.list()?.len(), 2);
        Ok(())
    }

    #[test]
    fn update_reprices_existing_and_rejects_unknown() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let catalog = ProductCatalog::new(temp.path());
        catalog.apply(ProductAction::Add(product("mug", 12.0)))?;

        let updated = catalog.apply(ProductAction::UpdatePrice {
            id: "mug".to_string(),
            price: 14.25,
        })?;
        assert_eq!(updated.price, 14.25);
        assert_eq!(catalog.list()?[0].price, 14.25);

        let missing = catalog.apply(ProductAction::UpdatePrice {
            id: "poster".to_string(),
            price: 9.0,
        });
        assert!(missing.is_err());
        Ok(())
    }

    #[test]
    fn prices_must_be_positive_numbers() {
        assert_eq!(parse_price(" 19.99 ").ok(), Some(19.99));
        for raw in ["0", "-3", "abc", "", "NaN", "inf"] {
            assert!(parse_price(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn form_parsing_picks_the_action() -> anyhow::Result<()> {
        let add = ProductAction::from_form(&form(&[
            ("action", "add"),
            ("id", "cap"),
            ("name", "Snapback"),
            ("price", "18"),
        ]))?;
        assert!(matches!(add, ProductAction::Add(ref p) if p.name == "Snapback"));

        let update =
            ProductAction::from_form(&form(&[("action", "update"), ("id", "cap"), ("price", "20")]))?;
        assert_eq!(
            update,
            ProductAction::UpdatePrice {
                id: "cap".to_string(),
                price: 20.0
            }
        );

        assert!(ProductAction::from_form(&form(&[("id", "cap"), ("price", "5")])).is_err());
        Ok(())
    }
}
