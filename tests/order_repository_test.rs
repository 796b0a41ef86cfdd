//! Order Store behaviour against a real (in-memory SQLite) database.

mod common;

use assert_matches::assert_matches;
use order_service::{
    entities::{order, OrderStatus},
    errors::ServiceError,
    repositories::{ListOrdersQuery, NewOrderItem, OrderRepository, OrderStore, PageRequest},
};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait};
use uuid::Uuid;

fn item(product_id: &str, quantity: i32, price: rust_decimal::Decimal) -> NewOrderItem {
    NewOrderItem {
        product_id: product_id.to_string(),
        quantity,
        price,
    }
}

async fn repository() -> OrderRepository {
    OrderRepository::new(common::test_db().await)
}

/// Makes every insert into `table` abort with a database error.
async fn reject_inserts(db: &DatabaseConnection, table: &str) {
    db.execute_unprepared(&format!(
        "CREATE TRIGGER reject_{table} BEFORE INSERT ON {table} \
         BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;"
    ))
    .await
    .expect("install trigger");
}

#[tokio::test]
async fn create_order_persists_totals_and_items_in_order() {
    let repo = repository().await;

    let created = repo
        .create_order(vec![
            item("P2", 1, dec!(12.50)),
            item("P1", 2, dec!(5)),
            item("P2", 3, dec!(12.50)),
        ])
        .await
        .unwrap();

    assert_eq!(created.order.total_amount, dec!(60));
    assert_eq!(created.order.total_items, 6);
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert!(!created.order.paid);
    assert!(created.order.paid_at.is_none());

    let found = repo.find_order(created.order.id).await.unwrap();
    let products: Vec<&str> = found.items.iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(products, vec!["P2", "P1", "P2"]);
    assert_eq!(found.order.id, created.order.id);
    assert_eq!(found.order.total_amount, dec!(60));
}

#[tokio::test]
async fn sub_cent_prices_keep_totals_consistent_after_reload() {
    let repo = repository().await;

    let created = repo
        .create_order(vec![item("P1", 3, dec!(19.9375)), item("P2", 7, dec!(0.0625))])
        .await
        .unwrap();
    assert_eq!(created.order.total_amount, dec!(60.25));

    let found = repo.find_order(created.order.id).await.unwrap();
    let recomputed: rust_decimal::Decimal = found
        .items
        .iter()
        .map(|i| i.price * rust_decimal::Decimal::from(i.quantity))
        .sum();
    assert_eq!(found.order.total_amount, recomputed);
    assert_eq!(found.items[0].price, dec!(19.9375));
    assert_eq!(found.items[1].price, dec!(0.0625));
}

#[tokio::test]
async fn failed_item_insert_rolls_back_the_order() {
    let db = common::test_db().await;
    let repo = OrderRepository::new(db.clone());
    reject_inserts(&db, "order_items").await;

    let err = repo
        .create_order(vec![item("P1", 1, dec!(5)), item("P2", 1, dec!(7))])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));

    assert_eq!(order::Entity::find().count(db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_receipt_insert_leaves_order_unpaid() {
    let db = common::test_db().await;
    let repo = OrderRepository::new(db.clone());
    let created = repo.create_order(vec![item("P1", 2, dec!(5))]).await.unwrap();
    reject_inserts(&db, "order_receipts").await;

    let err = repo
        .mark_paid(created.order.id, "pi_1".into(), "https://pay.test/r/1".into())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));

    let found = repo.find_order(created.order.id).await.unwrap();
    assert!(!found.order.paid);
    assert_eq!(found.order.status, OrderStatus::Pending);
    assert!(found.order.paid_at.is_none());
    assert!(found.order.external_payment_reference.is_none());
    assert!(repo
        .receipts_for_order(created.order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn find_order_unknown_id_is_not_found() {
    let repo = repository().await;
    let err = repo.find_order(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn update_status_overwrites_without_transition_rules() {
    let repo = repository().await;
    let created = repo.create_order(vec![item("P1", 1, dec!(5))]).await.unwrap();

    let delivered = repo
        .update_status(created.order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);

    // backwards is accepted too
    let pending = repo
        .update_status(created.order.id, OrderStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);
    assert!(!pending.paid);
}

#[tokio::test]
async fn update_status_unknown_id_is_not_found() {
    let repo = repository().await;
    let err = repo
        .update_status(Uuid::new_v4(), OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn mark_paid_sets_payment_fields_and_records_one_receipt() {
    let repo = repository().await;
    let created = repo.create_order(vec![item("P1", 2, dec!(5))]).await.unwrap();

    let paid = repo
        .mark_paid(
            created.order.id,
            "pi_123".to_string(),
            "https://pay.test/receipts/1".to_string(),
        )
        .await
        .unwrap();

    assert!(paid.paid);
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.external_payment_reference.as_deref(), Some("pi_123"));
    let paid_at = paid.paid_at.expect("paid_at stamped");
    assert!(paid_at >= paid.created_at);
    // totals are never recomputed
    assert_eq!(paid.total_amount, dec!(10));

    let receipts = repo.receipts_for_order(created.order.id).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].receipt_url, "https://pay.test/receipts/1");
}

#[tokio::test]
async fn replayed_payment_records_a_second_receipt() {
    let repo = repository().await;
    let created = repo.create_order(vec![item("P1", 1, dec!(5))]).await.unwrap();
    let id = created.order.id;

    let first = repo
        .mark_paid(id, "pi_1".into(), "https://pay.test/r/1".into())
        .await
        .unwrap();
    let second = repo
        .mark_paid(id, "pi_1".into(), "https://pay.test/r/1".into())
        .await
        .unwrap();

    assert!(second.paid_at >= first.paid_at);
    assert_eq!(repo.receipts_for_order(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn mark_paid_unknown_id_writes_nothing() {
    let repo = repository().await;
    let id = Uuid::new_v4();

    let err = repo
        .mark_paid(id, "pi_1".into(), "https://pay.test/r".into())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
    assert!(repo.receipts_for_order(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_orders_paginates_with_ceiling_page_count() {
    let repo = repository().await;
    for _ in 0..23 {
        repo.create_order(vec![item("P1", 1, dec!(1))]).await.unwrap();
    }

    let page = repo
        .list_orders(ListOrdersQuery {
            page: PageRequest::new(3, 10),
            status: None,
        })
        .await
        .unwrap();

    assert_eq!(page.orders.len(), 3);
    assert_eq!(page.pagination.current_page, 3);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.per_page, 10);
    assert_eq!(page.pagination.total_items, 23);

    let beyond = repo
        .list_orders(ListOrdersQuery {
            page: PageRequest::new(4, 10),
            status: None,
        })
        .await
        .unwrap();
    assert!(beyond.orders.is_empty());
    assert_eq!(beyond.pagination.total_items, 23);
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let repo = repository().await;
    let a = repo.create_order(vec![item("P1", 1, dec!(1))]).await.unwrap();
    repo.create_order(vec![item("P1", 1, dec!(1))]).await.unwrap();
    repo.mark_paid(a.order.id, "pi".into(), "https://r".into())
        .await
        .unwrap();

    let paid = repo
        .list_orders(ListOrdersQuery {
            page: PageRequest::new(1, 10),
            status: Some(OrderStatus::Paid),
        })
        .await
        .unwrap();

    assert_eq!(paid.pagination.total_items, 1);
    assert_eq!(paid.orders[0].id, a.order.id);

    let cancelled = repo
        .list_orders(ListOrdersQuery {
            page: PageRequest::new(1, 10),
            status: Some(OrderStatus::Cancelled),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.pagination.total_items, 0);
    assert_eq!(cancelled.pagination.total_pages, 0);
}

#[tokio::test]
async fn status_is_stored_as_upper_case_text() {
    let db = common::test_db().await;
    let repo = OrderRepository::new(db.clone());
    let created = repo.create_order(vec![item("P1", 1, dec!(1))]).await.unwrap();

    let raw = order::Entity::find_by_id(created.order.id)
        .into_json()
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("row present");
    assert_eq!(raw["status"], "PENDING");
}
