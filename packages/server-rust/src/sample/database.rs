//! In-memory stand-in for a relational database.
//!
//! Every call takes the [`SqlQuery`] the caller would have sent to a real
//! engine, logs its rendered text (tags included) under the `sqltag::sql`
//! target, and records it in the [`QueryLog`]. Results come from in-memory
//! collections.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use sqltag_core::SqlQuery;
use tracing::info;

use super::data::{seed_products, CreateOrderItem, Order, OrderItem, Product};

/// Rendered SQL of every executed query, oldest first.
#[derive(Debug, Default)]
pub struct QueryLog {
    entries: Mutex<Vec<String>>,
}

impl QueryLog {
    fn push(&self, sql: String) {
        self.entries.lock().push(sql);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.entries.lock().last().cloned()
    }
}

#[derive(Debug)]
pub struct Database {
    products: RwLock<Vec<Product>>,
    orders: RwLock<Vec<Order>>,
    log: QueryLog,
}

impl Database {
    /// Database preloaded with the sample catalog and no orders.
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            products: RwLock::new(seed_products()),
            orders: RwLock::new(Vec::new()),
            log: QueryLog::default(),
        }
    }

    #[must_use]
    pub fn log(&self) -> &QueryLog {
        &self.log
    }

    async fn execute(&self, query: &SqlQuery) {
        // Stand-in for the I/O wait; the request may resume on another worker.
        tokio::task::yield_now().await;
        let sql = query.to_sql();
        info!(target: "sqltag::sql", "Executed DbCommand\n{sql}");
        self.log.push(sql);
    }

    pub async fn products<F>(&self, query: SqlQuery, filter: F) -> Vec<Product>
    where
        F: Fn(&Product) -> bool + Send,
    {
        self.execute(&query).await;
        self.products
            .read()
            .iter()
            .filter(|p| filter(p))
            .cloned()
            .collect()
    }

    pub async fn product(&self, query: SqlQuery, id: u32) -> Option<Product> {
        self.execute(&query).await;
        self.products.read().iter().find(|p| p.id == id).cloned()
    }

    pub async fn orders(&self, query: SqlQuery) -> Vec<Order> {
        self.execute(&query).await;
        self.orders.read().clone()
    }

    pub async fn order(&self, query: SqlQuery, id: u32) -> Option<Order> {
        self.execute(&query).await;
        self.orders.read().iter().find(|o| o.id == id).cloned()
    }

    /// Inserts a pending order priced from `products`.
    ///
    /// Items whose product is missing from `products` are priced at zero;
    /// callers validate product ids first.
    pub async fn insert_order(
        &self,
        query: SqlQuery,
        customer_name: String,
        items: &[CreateOrderItem],
        products: &[Product],
    ) -> Order {
        self.execute(&query).await;

        let items: Vec<OrderItem> = items
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: products
                    .iter()
                    .find(|p| p.id == item.product_id)
                    .map_or(0.0, |p| p.price),
            })
            .collect();
        let total_amount = items
            .iter()
            .map(|i| f64::from(i.quantity) * i.unit_price)
            .sum();
        let order_date = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

        let mut orders = self.orders.write();
        let id = orders.iter().map(|o| o.id).max().unwrap_or(0) + 1;
        let order = Order {
            id,
            customer_name,
            order_date,
            total_amount,
            status: "Pending".to_string(),
            items,
        };
        orders.push(order.clone());
        order
    }
}
