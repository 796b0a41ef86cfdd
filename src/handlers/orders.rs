use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use tracing::debug;
use validator::Validate;

use super::common::{created_response, json_body, parse_order_id, query_params, validate_input};
use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    repositories::{ListOrdersQuery, PageRequest},
    services::orders::{ChangeStatusRequest, CreateOrderRequest, OrderListResponse, OrderResponse},
    AppState,
};

/// Query string of `GET /orders`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListOrdersParams {
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u64>,
    #[validate(range(min = 1, message = "limit must be a positive integer"))]
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

impl ListOrdersParams {
    /// Fills defaults from configuration and clamps `limit` to the configured maximum.
    pub fn into_query(self, default_limit: u64, max_limit: u64) -> ListOrdersQuery {
        let limit = self.limit.unwrap_or(default_limit).min(max_limit);
        ListOrdersQuery {
            page: PageRequest::new(self.page.unwrap_or(1), limit),
            status: self.status,
        }
    }
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_order_status))
}

/// `create_order`: responds 201 with `{order, paymentSession}`.
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let request = json_body(payload)?;
    validate_input(&request)?;

    let created = state.order_service.create_order(request).await?;
    Ok(created_response(created))
}

/// `find_all_orders`
pub async fn list_orders(
    State(state): State<AppState>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let params = query_params(params)?;
    validate_input(&params)?;

    let query = params.into_query(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    debug!(page = query.page.page, limit = query.page.limit, status = ?query.status, "Listing orders");

    let orders = state.order_service.find_all(query).await?;
    Ok(Json(orders))
}

/// `find_one_order`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order_id = parse_order_id(&id)?;
    let order = state.order_service.find_one(order_id).await?;
    Ok(Json(order))
}

/// `change_status_order`
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let order_id = parse_order_id(&id)?;
    let request = json_body(payload)?;

    let updated = state
        .order_service
        .change_status(order_id, request.status)
        .await?;
    Ok(Json(updated))
}
