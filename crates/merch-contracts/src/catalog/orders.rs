use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::{StudioError, StudioResult};
use crate::storage::read_json_array;

pub const ORDERS_FILE: &str = "orders.json";

/// Orders are written by the storefront, never by the studio; fields are read
/// leniently because numbers sometimes arrive as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: f64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub quantity: u64,
    #[serde(default)]
    pub design_text: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderRecord {
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OrderSummary {
    pub orders: usize,
    pub items: u64,
    pub revenue: f64,
}

/// Read-only view of `orders.json`.
#[derive(Debug, Clone)]
pub struct OrderBook {
    path: PathBuf,
}

impl OrderBook {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(ORDERS_FILE),
        }
    }

    pub fn list(&self) -> StudioResult<Vec<OrderRecord>> {
        read_json_array(&self.path).map_err(|err| StudioError::storage("Failed to read orders", &err))
    }
}

pub fn summarize(orders: &[OrderRecord]) -> OrderSummary {
    OrderSummary {
        orders: orders.len(),
        items: orders.iter().map(OrderRecord::item_count).sum(),
        revenue: orders.iter().map(|order| order.total).sum(),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64().unwrap_or_default(),
        Value::String(raw) => raw.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
            .unwrap_or_default(),
        Value::String(raw) => raw.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{summarize, OrderBook};

    #[test]
    fn orders_load_leniently_and_summarize() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("orders.json"),
            json!([
                {
                    "order_id": "A-100",
                    "date": "2024-05-01",
                    "customer_name": "Sam",
                    "customer_email": "sam@example.com",
                    "total": "54.00",
                    "items": [
                        {"quantity": "2", "design_text": "Hello", "product_name": "Tee"},
                        {"quantity": 1, "design_text": "", "product_name": "Mug"}
                    ]
                },
                {"order_id": "A-101", "total": 12.5, "items": [], "coupon": "SPRING"}
            ])
            .to_string(),
        )?;

        let orders = OrderBook::new(temp.path()).list()?;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].item_count(), 3);
        assert_eq!(orders[1].extra.get("coupon"), Some(&json!("SPRING")));

        let summary = summarize(&orders);
        assert_eq!(summary.orders, 2);
        assert_eq!(summary.items, 3);
        assert!((summary.revenue - 66.5).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn missing_orders_file_is_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(OrderBook::new(temp.path()).list()?.is_empty());
        Ok(())
    }
}
