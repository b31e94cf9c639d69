//! Product catalog handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqltag_core::{scope, Metadata, QueryTagExt, SqlQuery};
use tracing::info;

use super::data::Product;
use super::error::SampleError;
use super::SampleState;

/// `GET /api/products` -- tagged with the request scope opened by the middleware.
pub async fn list_products(State(state): State<SampleState>) -> Json<Vec<Product>> {
    info!("getting all products");

    let query = SqlQuery::new("SELECT p.* FROM Products AS p").tag_with_scope();
    Json(state.db.products(query, |_| true).await)
}

/// `GET /api/products/category/{category}` -- explicit query-level context.
pub async fn products_by_category(
    State(state): State<SampleState>,
    Path(category): Path<String>,
) -> Json<Vec<Product>> {
    info!(%category, "getting products by category");

    let query = SqlQuery::new("SELECT p.* FROM Products AS p WHERE p.Category = @category")
        .tag_with_context(
            "Products",
            Metadata::new()
                .with("Feature", "Catalog")
                .with("Action", "FilterByCategory")
                .with("Category", &category),
        );
    let products = state
        .db
        .products(query, move |p| p.category == category)
        .await;
    Json(products)
}

/// `GET /api/products/{id}` -- nested scope annotated through the ambient API.
pub async fn get_product(
    State(state): State<SampleState>,
    Path(id): Path<u32>,
) -> Result<Json<Product>, SampleError> {
    info!(id, "getting product by id");

    let _scope = scope::begin("Products", Some("GetById"));
    scope::annotate_current("ProductId", id.to_string());

    let query =
        SqlQuery::new("SELECT p.* FROM Products AS p WHERE p.Id = @id LIMIT 1").tag_with_scope();
    state
        .db
        .product(query, id)
        .await
        .map(Json)
        .ok_or(SampleError::NotFound {
            entity: "product",
            id,
        })
}

/// Query string of `GET /api/products/search`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchContext {
    feature: &'static str,
    action: &'static str,
    has_name_filter: bool,
    has_price_filter: bool,
}

/// `GET /api/products/search` -- context built from a serializable struct.
pub async fn search_products(
    State(state): State<SampleState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Product>>, SampleError> {
    info!(?params, "searching products");

    let name = params.name.filter(|n| !n.is_empty());
    let mut sql = String::from("SELECT p.* FROM Products AS p WHERE 1 = 1");
    if name.is_some() {
        sql.push_str(" AND (p.Name LIKE @name OR p.Description LIKE @name)");
    }
    if params.min_price.is_some() {
        sql.push_str(" AND p.Price >= @minPrice");
    }
    if params.max_price.is_some() {
        sql.push_str(" AND p.Price <= @maxPrice");
    }

    let context = Metadata::from_serialize(&SearchContext {
        feature: "Catalog",
        action: "Search",
        has_name_filter: name.is_some(),
        has_price_filter: params.min_price.is_some() || params.max_price.is_some(),
    })?;
    let query = SqlQuery::new(sql).tag_with_context("ProductSearch", context);

    let (min, max) = (params.min_price, params.max_price);
    let products = state
        .db
        .products(query, move |p| {
            name.as_deref()
                .map_or(true, |n| p.name.contains(n) || p.description.contains(n))
                && min.map_or(true, |min| p.price >= min)
                && max.map_or(true, |max| p.price <= max)
        })
        .await;
    Ok(Json(products))
}
