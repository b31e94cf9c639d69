//! Catalog and order records served by the sample application.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u32,
    pub customer_name: String,
    /// Milliseconds since the Unix epoch.
    pub order_date: u64,
    pub total_amount: f64,
    pub status: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: u32,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: u32,
    pub quantity: u32,
}

/// Products the in-memory database starts with.
#[must_use]
pub fn seed_products() -> Vec<Product> {
    let product = |id, name: &str, description: &str, price, category: &str, stock_quantity| Product {
        id,
        name: name.to_string(),
        description: description.to_string(),
        price,
        category: category.to_string(),
        stock_quantity,
    };

    vec![
        product(1, "Laptop", "High-performance laptop", 1299.99, "Electronics", 50),
        product(2, "Wireless Mouse", "Ergonomic wireless mouse", 49.99, "Electronics", 200),
        product(3, "Mechanical Keyboard", "RGB mechanical keyboard", 129.99, "Electronics", 75),
        product(4, "Monitor 27\"", "4K IPS monitor", 449.99, "Electronics", 30),
        product(5, "USB-C Hub", "Multi-port USB-C hub", 79.99, "Accessories", 100),
    ]
}
