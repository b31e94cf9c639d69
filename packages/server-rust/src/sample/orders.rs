//! Order handlers.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sqltag_core::{scope, QueryTagExt, SqlQuery};
use tracing::info;

use super::data::{CreateOrderRequest, Order};
use super::error::SampleError;
use super::SampleState;

/// `GET /api/orders`
pub async fn list_orders(State(state): State<SampleState>) -> Json<Vec<Order>> {
    info!("getting all orders");

    let query = SqlQuery::new(
        "SELECT o.*, i.* FROM Orders AS o LEFT JOIN OrderItems AS i ON o.Id = i.OrderId",
    )
    .tag_with_context(
        "Orders",
        [("Feature", "OrderManagement"), ("Action", "List")],
    );
    Json(state.db.orders(query).await)
}

/// `GET /api/orders/{id}` -- nested scope carrying the order id.
pub async fn get_order(
    State(state): State<SampleState>,
    Path(id): Path<u32>,
) -> Result<Json<Order>, SampleError> {
    info!(id, "getting order by id");

    let _order_scope =
        scope::begin("Orders", Some("GetById")).with_metadata("OrderId", id.to_string());

    let query = SqlQuery::new(
        "SELECT o.*, i.* FROM Orders AS o LEFT JOIN OrderItems AS i ON o.Id = i.OrderId WHERE o.Id = @id",
    )
    .tag_with_scope();
    state
        .db
        .order(query, id)
        .await
        .map(Json)
        .ok_or(SampleError::NotFound { entity: "order", id })
}

/// `POST /api/orders`
///
/// Every product id must exist; otherwise responds 400 without writing.
pub async fn create_order(
    State(state): State<SampleState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, SampleError> {
    info!(customer = %request.customer_name, "creating order");

    let _scope = scope::begin("Orders", Some("Create"))
        .with_metadata("CustomerName", request.customer_name.clone());

    let product_ids: BTreeSet<u32> = request.items.iter().map(|i| i.product_id).collect();
    let lookup = product_ids.clone();
    let query = SqlQuery::new("SELECT p.* FROM Products AS p WHERE p.Id IN (@ids)").tag_with_scope();
    let products = state
        .db
        .products(query, move |p| lookup.contains(&p.id))
        .await;

    if products.len() != product_ids.len() {
        return Err(SampleError::BadRequest(
            "One or more products not found".to_string(),
        ));
    }

    let query = SqlQuery::new(
        "INSERT INTO Orders (CustomerName, OrderDate, TotalAmount, Status) VALUES (@p0, @p1, @p2, @p3)",
    )
    .tag_with_scope();
    let order = state
        .db
        .insert_order(query, request.customer_name, &request.items, &products)
        .await;

    let location = format!("/api/orders/{}", order.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(order)))
}
