//! Sample catalog service demonstrating request-scoped query tagging.
//!
//! Handlers build [`SqlQuery`](sqltag_core::SqlQuery) values, tag them either
//! from the ambient request scope or with explicit context, and hand them to
//! an in-memory [`Database`] that logs the rendered SQL.

pub mod data;
pub mod database;
pub mod error;
pub mod identity;
pub mod orders;
pub mod products;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::Method;

pub use database::{Database, QueryLog};
pub use error::SampleError;
pub use identity::{demo_identity, DEMO_USER_HEADER};

use crate::tagging::EndpointCatalog;

/// Shared state for the sample handlers.
#[derive(Debug, Clone)]
pub struct SampleState {
    pub db: Arc<Database>,
}

impl SampleState {
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            db: Arc::new(Database::seeded()),
        }
    }
}

/// Controller/action names for every sample route.
#[must_use]
pub fn endpoints() -> EndpointCatalog {
    EndpointCatalog::new()
        .with(Method::GET, "/api/products", "Products", "GetAll")
        .with(
            Method::GET,
            "/api/products/category/{category}",
            "Products",
            "GetByCategory",
        )
        .with(Method::GET, "/api/products/search", "Products", "Search")
        .with(Method::GET, "/api/products/{id}", "Products", "GetById")
        .with(Method::GET, "/api/orders", "Orders", "GetAll")
        .with(Method::POST, "/api/orders", "Orders", "Create")
        .with(Method::GET, "/api/orders/{id}", "Orders", "GetById")
}

/// Sample API routes, without middleware.
pub fn routes() -> Router<SampleState> {
    Router::new()
        .route("/api/products", get(products::list_products))
        .route(
            "/api/products/category/{category}",
            get(products::products_by_category),
        )
        .route("/api/products/search", get(products::search_products))
        .route("/api/products/{id}", get(products::get_product))
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/api/orders/{id}", get(orders::get_order))
}
