use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::{order, order_item, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{ListOrdersQuery, NewOrderItem, OrderStore, OrderWithItems, PaginationMeta},
    services::{
        catalog::{CatalogSnapshot, ProductValidator},
        payments::{
            PaymentLineItem, PaymentSession, PaymentSessionRequest, PaymentSessionRequester,
            PAYMENT_CURRENCY,
        },
    },
};

/// Request/Response types for the order service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(
        length(min = 1, message = "An order needs at least one item"),
        custom = "validate_order_items"
    )]
    pub items: Vec<CreateOrderItem>,
}

fn validate_order_items(items: &[CreateOrderItem]) -> Result<(), ValidationError> {
    for item in items {
        if let Err(errors) = item.validate() {
            let mut err = ValidationError::new("items");
            err.message = Some(format!("invalid item {}: {}", item.product_id, errors).into());
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
}

/// Payment confirmation as delivered by the payment service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrderRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "stripePaymentId is required"))]
    pub stripe_payment_id: String,
    #[validate(length(min = 1, message = "receiptUrl is required"))]
    pub receipt_url: String,
}

/// Line item as returned to callers. `name` comes from the catalog at read
/// time; `price` is the stored purchase price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: String,
    pub name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub total_items: i32,
    pub status: OrderStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub external_payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItemView>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            total_amount: model.total_amount,
            total_items: model.total_items,
            status: model.status,
            paid: model.paid,
            paid_at: model.paid_at,
            external_payment_reference: model.external_payment_reference,
            created_at: model.created_at,
            updated_at: model.updated_at,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    pub payment_session: PaymentSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMeta {
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub data: Vec<OrderResponse>,
    pub meta: ListMeta,
}

/// Coordinates the catalog, the order store and the payment service.
///
/// Holds no mutable state of its own; every operation runs to completion
/// or failure with no compensation across collaborators.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductValidator>,
    payments: Arc<dyn PaymentSessionRequester>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn ProductValidator>,
        payments: Arc<dyn PaymentSessionRequester>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            catalog,
            payments,
            event_sender,
        }
    }

    /// Creates an order priced from the catalog, then opens a payment session.
    ///
    /// The order is committed before the payment service is called. If that
    /// call fails the order stays persisted as `PENDING` and the error is
    /// returned.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request.validate()?;

        let product_ids: Vec<String> = request
            .items
            .iter()
            .map(|item| item.product_id.clone())
            .collect();
        let snapshot = CatalogSnapshot::new(self.catalog.validate(&product_ids).await?);

        let priced = request
            .items
            .iter()
            .map(|item| {
                let product = snapshot.lookup(&item.product_id)?;
                Ok(NewOrderItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: product.price,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let stored = self.store.create_order(priced).await?;
        let order_id = stored.order.id;
        metrics::counter!("order_service.orders.created", 1);
        info!(order_id = %order_id, total_amount = %stored.order.total_amount, "Order created");

        let order = enrich(stored, &snapshot)?;

        let session_request = PaymentSessionRequest {
            order_id,
            currency: PAYMENT_CURRENCY.to_string(),
            items: order
                .items
                .iter()
                .map(|item| PaymentLineItem {
                    name: item.name.clone(),
                    price: item.price,
                    quantity: item.quantity,
                })
                .collect(),
        };

        let payment_session = match self.payments.request_session(session_request).await {
            Ok(session) => session,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Order persisted without a payment session");
                metrics::counter!("order_service.payment_session.failed", 1);
                return Err(e);
            }
        };

        self.publish(Event::OrderCreated(order_id)).await;

        Ok(CreateOrderResponse {
            order,
            payment_session,
        })
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self, query: ListOrdersQuery) -> Result<OrderListResponse, ServiceError> {
        let page = self.store.list_orders(query).await?;
        Ok(OrderListResponse {
            data: page.orders.into_iter().map(OrderResponse::from).collect(),
            meta: ListMeta {
                pagination: page.pagination,
            },
        })
    }

    /// Loads an order and attaches current catalog names to its items.
    #[instrument(skip(self))]
    pub async fn find_one(&self, id: Uuid) -> Result<OrderResponse, ServiceError> {
        let stored = self.store.find_order(id).await?;

        let product_ids: Vec<String> = stored
            .items
            .iter()
            .map(|item| item.product_id.clone())
            .collect();
        let snapshot = CatalogSnapshot::new(self.catalog.validate(&product_ids).await?);

        enrich(stored, &snapshot)
    }

    /// Overwrites the status of an existing order. Any value is accepted.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        self.find_one(id).await?;

        let updated = self.store.update_status(id, status).await?;
        info!(order_id = %id, status = %status, "Order status changed");
        self.publish(Event::OrderStatusChanged {
            order_id: id,
            new_status: status,
        })
        .await;

        Ok(updated.into())
    }

    /// Applies a payment confirmation. Replays are applied again.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn paid_order(&self, request: PaidOrderRequest) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let updated = self
            .store
            .mark_paid(
                request.order_id,
                request.stripe_payment_id.clone(),
                request.receipt_url,
            )
            .await?;

        metrics::counter!("order_service.orders.paid", 1);
        info!(order_id = %updated.id, "Order marked paid");
        self.publish(Event::OrderPaid {
            order_id: updated.id,
            external_payment_reference: request.stripe_payment_id,
        })
        .await;

        Ok(updated.into())
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to publish order event");
            }
        }
    }
}

fn enrich(stored: OrderWithItems, snapshot: &CatalogSnapshot) -> Result<OrderResponse, ServiceError> {
    let items = stored
        .items
        .into_iter()
        .map(|item: order_item::Model| {
            let product = snapshot.lookup(&item.product_id)?;
            Ok(OrderItemView {
                name: product.name.clone(),
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    let mut response = OrderResponse::from(stored.order);
    response.items = items;
    Ok(response)
}
