//! Order Store: durable record of orders, their line items and receipts.
//!
//! Each write operation runs in its own database transaction so that an
//! order and its items (or a status flip and its receipt) land together or
//! not at all. Nothing here spans a call to another service.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::order_receipt::{self, Entity as OrderReceiptEntity};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Line item with its price already resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Derived order totals. Computed once at creation and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub total_amount: Decimal,
    pub total_items: i32,
}

impl OrderTotals {
    /// Sums `price * quantity` and the item count. Overflow of either sum is
    /// a validation failure.
    pub fn from_items(items: &[NewOrderItem]) -> Result<Self, ServiceError> {
        items.iter().try_fold(
            OrderTotals {
                total_amount: Decimal::ZERO,
                total_items: 0,
            },
            |acc, item| {
                let line_amount = item
                    .price
                    .checked_mul(Decimal::from(item.quantity))
                    .ok_or_else(|| totals_overflow(&item.product_id))?;
                Ok(OrderTotals {
                    total_amount: acc
                        .total_amount
                        .checked_add(line_amount)
                        .ok_or_else(|| totals_overflow(&item.product_id))?,
                    total_items: acc
                        .total_items
                        .checked_add(item.quantity)
                        .ok_or_else(|| totals_overflow(&item.product_id))?,
                })
            },
        )
    }
}

fn totals_overflow(product_id: &str) -> ServiceError {
    ServiceError::ValidationError(format!(
        "order totals out of range at product {}",
        product_id
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWithItems {
    pub order: order::Model,
    /// Ordered by insertion position
    pub items: Vec<order_item::Model>,
}

/// Offset pagination window. `page` is one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }

    pub fn total_pages(&self, total_items: u64) -> u64 {
        total_items.div_ceil(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrdersQuery {
    pub page: PageRequest,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub current_page: u64,
    pub total_pages: u64,
    pub per_page: u64,
    pub total_items: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub pagination: PaginationMeta,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and all of its items atomically.
    async fn create_order(&self, items: Vec<NewOrderItem>) -> Result<OrderWithItems, ServiceError>;

    async fn find_order(&self, id: Uuid) -> Result<OrderWithItems, ServiceError>;

    /// Overwrites the status. No transition rules are applied.
    async fn update_status(&self, id: Uuid, status: OrderStatus)
        -> Result<order::Model, ServiceError>;

    /// Marks the order paid and records a receipt in one transaction.
    /// Calling it twice records a second receipt and restamps `paid_at`.
    async fn mark_paid(
        &self,
        id: Uuid,
        external_payment_reference: String,
        receipt_url: String,
    ) -> Result<order::Model, ServiceError>;

    async fn list_orders(&self, query: ListOrdersQuery) -> Result<OrderPage, ServiceError>;
}

/// sea-orm backed [`OrderStore`].
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Receipts recorded for an order, oldest first.
    pub async fn receipts_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_receipt::Model>, ServiceError> {
        let receipts = OrderReceiptEntity::find()
            .filter(order_receipt::Column::OrderId.eq(order_id))
            .order_by_asc(order_receipt::Column::CreatedAt)
            .all(self.get_db())
            .await?;
        Ok(receipts)
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self, items), fields(items = items.len()))]
    async fn create_order(&self, items: Vec<NewOrderItem>) -> Result<OrderWithItems, ServiceError> {
        let totals = OrderTotals::from_items(&items)?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.get_db().begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order = order::ActiveModel {
            id: Set(order_id),
            total_amount: Set(totals.total_amount),
            total_items: Set(totals.total_items),
            status: Set(OrderStatus::Pending),
            paid: Set(false),
            paid_at: Set(None),
            external_payment_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut stored_items = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            let stored = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                position: Set(position as i32),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order item");
                ServiceError::DatabaseError(e)
            })?;
            stored_items.push(stored);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, total_amount = %order.total_amount, "Order persisted");
        Ok(OrderWithItems {
            order,
            items: stored_items,
        })
    }

    #[instrument(skip(self))]
    async fn find_order(&self, id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let db = self.get_db();
        let order = OrderEntity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::order_not_found(id))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::Position)
            .all(db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.get_db().begin().await?;

        let existing = OrderEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::order_not_found(id))?;

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(status);
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self, receipt_url))]
    async fn mark_paid(
        &self,
        id: Uuid,
        external_payment_reference: String,
        receipt_url: String,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.get_db().begin().await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to start transaction for payment");
            ServiceError::DatabaseError(e)
        })?;

        let existing = OrderEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::order_not_found(id))?;

        let now = Utc::now();
        let mut active: order::ActiveModel = existing.into();
        active.status = Set(OrderStatus::Paid);
        active.paid = Set(true);
        active.paid_at = Set(Some(now));
        active.external_payment_reference = Set(Some(external_payment_reference));
        let updated = active.update(&txn).await?;

        order_receipt::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(id),
            receipt_url: Set(receipt_url),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to record receipt");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to commit payment");
            ServiceError::DatabaseError(e)
        })?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, query: ListOrdersQuery) -> Result<OrderPage, ServiceError> {
        let db = self.get_db();
        let mut select = OrderEntity::find();
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }

        let total_items = select.clone().count(db).await?;
        let orders = select
            .order_by_desc(order::Column::CreatedAt)
            .order_by_asc(order::Column::Id)
            .offset(query.page.offset())
            .limit(query.page.limit)
            .all(db)
            .await?;

        Ok(OrderPage {
            orders,
            pagination: PaginationMeta {
                current_page: query.page.page,
                total_pages: query.page.total_pages(total_items),
                per_page: query.page.limit,
                total_items,
            },
        })
    }
}
