mod orders;
mod products;

pub use orders::{summarize, OrderBook, OrderItem, OrderRecord, OrderSummary, ORDERS_FILE};
pub use products::{parse_price, ProductAction, ProductCatalog, ProductRecord, PRODUCTS_FILE};
